//! Wire codecs for HTTP/1.x.
//!
//! - [`RequestDecoder`] turns bytes into complete `http::Request<Bytes>` values,
//!   handling `Content-Length` and chunked request payloads.
//! - [`ResponseEncoder`] writes a response head followed by payload items,
//!   framed by `Content-Length` or chunked transfer encoding.
//!
//! Both plug into `tokio_util::codec::{FramedRead, FramedWrite}`.

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::{DEFAULT_MAX_BODY_SIZE, RequestDecoder};
pub use response_encoder::ResponseEncoder;
