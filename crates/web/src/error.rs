//! Errors raised while a request travels through the pipeline.
//!
//! Every [`EdgeError`] maps to one status code. The response body carries only
//! the canonical reason phrase of that status; the details stay in the logs.

use std::error::Error;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use thiserror::Error;

use crate::body::ResponseBody;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("payload too large, limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("internal error: {source}")]
    Internal {
        #[source]
        source: BoxError,
    },
}

impl EdgeError {
    pub fn bad_request<S: ToString>(reason: S) -> Self {
        Self::BadRequest { reason: reason.to_string() }
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::PayloadTooLarge { limit }
    }

    pub fn internal<E: Into<BoxError>>(source: E) -> Self {
        Self::Internal { source: source.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EdgeError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            EdgeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EdgeError::Forbidden => StatusCode::FORBIDDEN,
            EdgeError::NotFound => StatusCode::NOT_FOUND,
            EdgeError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The terminal response for this error.
    pub fn into_response(self) -> Response<ResponseBody> {
        error_response(self.status())
    }
}

impl From<std::io::Error> for EdgeError {
    fn from(e: std::io::Error) -> Self {
        Self::internal(e)
    }
}

pub(crate) fn error_response(status: StatusCode) -> Response<ResponseBody> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(ResponseBody::once(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
