//! Hardening headers added to every response.

use crate::body::ResponseBody;
use crate::request::EdgeRequest;
use crate::stage::Stage;
use async_trait::async_trait;
use http::{HeaderName, HeaderValue, Response};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';script-src 'self';\
script-src-attr 'none';style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests";

static SECURITY_HEADERS: [(HeaderName, &str); 12] = [
    (http::header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
    (HeaderName::from_static("cross-origin-opener-policy"), "same-origin"),
    (HeaderName::from_static("cross-origin-resource-policy"), "same-origin"),
    (HeaderName::from_static("origin-agent-cluster"), "?1"),
    (http::header::REFERRER_POLICY, "no-referrer"),
    (http::header::STRICT_TRANSPORT_SECURITY, "max-age=15552000; includeSubDomains"),
    (http::header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (http::header::X_DNS_PREFETCH_CONTROL, "off"),
    (HeaderName::from_static("x-download-options"), "noopen"),
    (http::header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (HeaderName::from_static("x-permitted-cross-domain-policies"), "none"),
    (http::header::X_XSS_PROTECTION, "0"),
];

/// Inserts a fixed set of security headers, replacing any earlier value, and
/// removes `X-Powered-By`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityHeaders;

#[async_trait]
impl Stage for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security-headers"
    }

    fn on_response(&self, _req: &EdgeRequest, resp: &mut Response<ResponseBody>) {
        let headers = resp.headers_mut();
        headers.remove("x-powered-by");
        for (name, value) in SECURITY_HEADERS.iter() {
            headers.insert(name.clone(), HeaderValue::from_static(*value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;

    #[test]
    fn test_headers_present_once() {
        let req: EdgeRequest = Request::builder().body(Bytes::new()).unwrap().into();
        let mut resp = Response::new(ResponseBody::empty());
        resp.headers_mut().insert("x-powered-by", HeaderValue::from_static("koa"));
        resp.headers_mut().append(http::header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        resp.headers_mut().append(http::header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOW"));

        SecurityHeaders.on_response(&req, &mut resp);
        SecurityHeaders.on_response(&req, &mut resp);

        assert!(resp.headers().get("x-powered-by").is_none());
        for (name, value) in SECURITY_HEADERS.iter() {
            let values: Vec<&str> = resp.headers().get_all(name).iter().map(|v| v.to_str().unwrap()).collect();
            assert_eq!(values, vec![*value], "header {name}");
        }
    }
}
