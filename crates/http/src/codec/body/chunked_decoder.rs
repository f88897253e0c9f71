//! Decoder for `Transfer-Encoding: chunked` payloads, see
//! [RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// Longest chunk-size line accepted, extensions included.
const MAX_LINE_BYTES: usize = 4096;

/// Decodes a chunked payload into [`PayloadItem`]s.
///
/// Each call returns at most one chunk of data. Chunk extensions and trailer
/// fields are read and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a `size[;ext]\r\n` line
    Size,
    /// Inside chunk data with this many bytes left
    Data(u64),
    /// Expecting the CRLF that closes chunk data
    DataCrlf,
    /// After the last chunk, skipping trailer lines until an empty one
    Trailer,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { State::Trailer } else { State::Data(size) };
                }

                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = remaining.min(src.len() as u64);
                    let bytes = src.split_to(len as usize).freeze();
                    let left = remaining - len;
                    self.state = if left == 0 { State::DataCrlf } else { State::Data(left) };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataCrlf => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(ParseError::invalid_body("missing CRLF after chunk data"));
                    }
                    src.advance(2);
                    self.state = State::Size;
                }

                State::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = State::End;
                    }
                }

                State::End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }
            }
        }
    }
}

/// Splits one CRLF terminated line off `src`, without the terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = src.split_to(pos);
            src.advance(2);
            Ok(Some(line))
        }
        None if src.len() > MAX_LINE_BYTES => Err(ParseError::invalid_body("chunk line too long")),
        None => Ok(None),
    }
}

fn parse_size(line: &[u8]) -> Result<u64, ParseError> {
    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    if size.is_empty() || size.len() > 16 {
        return Err(ParseError::invalid_body("invalid chunk size"));
    }

    size.iter().try_fold(0u64, |acc, b| {
        let digit = (*b as char).to_digit(16).ok_or_else(|| ParseError::invalid_body("invalid chunk size"))?;
        Ok(acc * 16 + u64::from(digit))
    })
}
