//! Payload framing for request and response bodies.
//!
//! [`PayloadDecoder`] reads `Content-Length` and chunked request payloads,
//! [`PayloadEncoder`] writes response payloads in either framing.

mod chunked_decoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
