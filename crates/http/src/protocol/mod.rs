//! Protocol types shared by the codec and the connection loop.
//!
//! Requests are delivered to handlers fully buffered as `http::Request<Bytes>`;
//! the edge pipeline needs the complete raw body before any stage runs, so the
//! decoder collects the payload instead of streaming it. Responses stay
//! streaming: any `http_body::Body` can be written, framed either by
//! `Content-Length` or chunked transfer encoding ([`PayloadSize`]).

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
