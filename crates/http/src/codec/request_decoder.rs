//! Decodes complete requests from a byte stream.
//!
//! The head is parsed first, then the payload is collected until its framing
//! says it is complete. Only then is an `http::Request<Bytes>` produced, so a
//! partially received body never reaches a handler.

use bytes::{Bytes, BytesMut};
use http::Request;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Largest request body the decoder buffers, 256 MiB.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Upper bound of the buffer reserved up front from a declared `Content-Length`.
const INITIAL_BODY_CAPACITY: u64 = 64 * 1024;

#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    max_body_size: u64,
    in_flight: Option<InFlight>,
}

/// A request whose head is parsed and whose body is still arriving.
#[derive(Debug)]
struct InFlight {
    head: Request<()>,
    payload_decoder: PayloadDecoder,
    body: BytesMut,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::with_max_body_size(DEFAULT_MAX_BODY_SIZE)
    }

    pub fn with_max_body_size(max_body_size: u64) -> Self {
        Self { header_decoder: HeaderDecoder, max_body_size, in_flight: None }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RequestDecoder {
    type Item = Request<Bytes>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.in_flight.is_none() {
            let Some((head, payload_size)) = self.header_decoder.decode(src)? else {
                return Ok(None);
            };

            let body = match payload_size {
                PayloadSize::Length(n) if n > self.max_body_size => {
                    return Err(ParseError::too_large_body(n, self.max_body_size));
                }
                PayloadSize::Length(n) => BytesMut::with_capacity(n.min(INITIAL_BODY_CAPACITY) as usize),
                PayloadSize::Chunked | PayloadSize::Empty => BytesMut::new(),
            };

            self.in_flight = Some(InFlight { head, payload_decoder: payload_size.into(), body });
        }

        let Some(in_flight) = self.in_flight.as_mut() else {
            return Ok(None);
        };

        loop {
            match in_flight.payload_decoder.decode(src)? {
                Some(PayloadItem::Chunk(bytes)) => {
                    let current_size = (in_flight.body.len() + bytes.len()) as u64;
                    if current_size > self.max_body_size {
                        return Err(ParseError::too_large_body(current_size, self.max_body_size));
                    }
                    in_flight.body.extend_from_slice(&bytes);
                }
                Some(PayloadItem::Eof) => break,
                None => return Ok(None),
            }
        }

        let Some(InFlight { head, body, .. }) = self.in_flight.take() else {
            return Ok(None);
        };
        trace!(body_size = body.len(), "decoded request");
        let (parts, ()) = head.into_parts();
        Ok(Some(Request::from_parts(parts, body.freeze())))
    }
}
