//! Conversion of route handler results into responses.

use crate::body::ResponseBody;
use crate::error::EdgeError;
use crate::request::EdgeRequest;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use serde_json::Value;

/// A trait for types that can be converted into HTTP responses.
pub trait Responder {
    fn response_to(self, req: &EdgeRequest) -> Response<ResponseBody>;
}

impl<T: Responder, E: Responder> Responder for Result<T, E> {
    fn response_to(self, req: &EdgeRequest) -> Response<ResponseBody> {
        match self {
            Ok(t) => t.response_to(req),
            Err(e) => e.response_to(req),
        }
    }
}

/// `None` answers 404.
impl<T: Responder> Responder for Option<T> {
    fn response_to(self, req: &EdgeRequest) -> Response<ResponseBody> {
        match self {
            Some(t) => t.response_to(req),
            None => EdgeError::NotFound.into_response(),
        }
    }
}

impl<B> Responder for Response<B>
where
    B: Into<ResponseBody>,
{
    fn response_to(self, _req: &EdgeRequest) -> Response<ResponseBody> {
        self.map(|b| b.into())
    }
}

impl<T: Responder> Responder for (StatusCode, T) {
    fn response_to(self, req: &EdgeRequest) -> Response<ResponseBody> {
        let (status, responder) = self;
        let mut response = responder.response_to(req);
        *response.status_mut() = status;
        response
    }
}

impl<T: Responder> Responder for Box<T> {
    fn response_to(self, req: &EdgeRequest) -> Response<ResponseBody> {
        (*self).response_to(req)
    }
}

impl Responder for () {
    fn response_to(self, _req: &EdgeRequest) -> Response<ResponseBody> {
        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
    }
}

impl Responder for &'static str {
    fn response_to(self, _req: &EdgeRequest) -> Response<ResponseBody> {
        text_response(ResponseBody::from(self))
    }
}

impl Responder for String {
    fn response_to(self, _req: &EdgeRequest) -> Response<ResponseBody> {
        text_response(ResponseBody::from(self))
    }
}

/// Left unserialized: the pretty printer renders it on the way out.
impl Responder for Value {
    fn response_to(self, _req: &EdgeRequest) -> Response<ResponseBody> {
        Response::new(ResponseBody::json(self))
    }
}

impl Responder for EdgeError {
    fn response_to(self, _req: &EdgeRequest) -> Response<ResponseBody> {
        self.into_response()
    }
}

fn text_response(body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use serde_json::json;

    fn req() -> EdgeRequest {
        Request::builder().body(Bytes::new()).unwrap().into()
    }

    #[test]
    fn test_string() {
        let response = String::from("hi").response_to(&req());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_json_stays_structured() {
        let mut response = json!({"ok": true}).response_to(&req());
        assert_eq!(response.body_mut().take_json(), Some(json!({"ok": true})));
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_none_is_not_found() {
        let response = Option::<String>::None.response_to(&req());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_tuple() {
        let response = (StatusCode::ACCEPTED, "queued").response_to(&req());
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
