//! Cross-origin resource sharing.
//!
//! Preflight requests are answered directly with `204 No Content`. Every other
//! response gets its `Access-Control-*` headers in the response phase, so
//! error and static responses carry them too.

use crate::body::ResponseBody;
use crate::config::{AllowedOrigins, CorsPolicy};
use crate::error::EdgeError;
use crate::request::EdgeRequest;
use crate::stage::{Outcome, Stage, merge_vary};
use async_trait::async_trait;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
};
use http::{HeaderValue, Method, Response, StatusCode};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Cors {
    origins: AllowedOrigins,
    allow_methods: HeaderValue,
    allow_headers: Option<HeaderValue>,
    expose_headers: Option<HeaderValue>,
    allow_credentials: bool,
    max_age: Option<HeaderValue>,
}

impl Cors {
    pub fn new(policy: &CorsPolicy) -> Self {
        let methods = policy.allow_methods.iter().map(Method::as_str).collect::<Vec<_>>().join(",");
        Self {
            origins: policy.origins.clone(),
            allow_methods: header_value(&methods).unwrap_or_else(|| HeaderValue::from_static("GET,HEAD,PUT,POST,DELETE,PATCH")),
            allow_headers: policy.allow_headers.as_ref().and_then(|headers| header_value(&headers.join(","))),
            expose_headers: Some(policy.expose_headers.join(",")).filter(|s| !s.is_empty()).and_then(|s| header_value(&s)),
            allow_credentials: policy.allow_credentials,
            max_age: policy.max_age.map(HeaderValue::from),
        }
    }

    /// The value of `Access-Control-Allow-Origin` for this request, if any.
    fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        match (&self.origins, origin) {
            (AllowedOrigins::Any, Some(origin)) => Some(origin.clone()),
            (AllowedOrigins::Any, None) => Some(HeaderValue::from_static("*")),
            (AllowedOrigins::List(allowed), Some(origin)) => {
                let origin_str = origin.to_str().ok()?;
                allowed.iter().any(|allowed| allowed == origin_str).then(|| origin.clone())
            }
            (AllowedOrigins::List(_), None) => None,
        }
    }
}

fn header_value(value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(value, cause = %e, "ignore invalid cors header value");
            None
        }
    }
}

fn is_preflight(req: &EdgeRequest) -> bool {
    req.method() == Method::OPTIONS
        && req.headers().contains_key(ORIGIN)
        && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

#[async_trait]
impl Stage for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn on_request(&self, req: &mut EdgeRequest) -> Result<Outcome, EdgeError> {
        if !is_preflight(req) {
            return Ok(Outcome::Continue);
        }

        debug!(path = req.uri().path(), "answer cors preflight");
        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());

        let allow_headers =
            self.allow_headers.clone().or_else(|| req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS).cloned());
        if let Some(allow_headers) = allow_headers {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
        }
        if let Some(max_age) = &self.max_age {
            headers.insert(ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }

        Ok(Outcome::Handled(response))
    }

    fn on_response(&self, req: &EdgeRequest, resp: &mut Response<ResponseBody>) {
        let origin = req.headers().get(ORIGIN);
        let headers = resp.headers_mut();

        merge_vary(headers, "Origin");

        let Some(allow_origin) = self.allow_origin(origin) else {
            headers.remove(ACCESS_CONTROL_ALLOW_ORIGIN);
            return;
        };

        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(expose_headers) = &self.expose_headers {
            headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, expose_headers.clone());
        }
    }
}
