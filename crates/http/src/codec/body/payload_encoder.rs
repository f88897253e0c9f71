use std::io::Write;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Frames response payload items on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Bytes still allowed for a `Content-Length` payload
    Length(u64),
    Chunked { eof: bool },
    NoBody,
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(size: PayloadSize) -> Self {
        let kind = match size {
            PayloadSize::Length(n) => Kind::Length(n),
            PayloadSize::Chunked => Kind::Chunked { eof: false },
            PayloadSize::Empty => Kind::NoBody,
        };
        Self { kind }
    }
}

impl PayloadEncoder {
    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(remaining) => *remaining == 0,
            Kind::Chunked { eof } => *eof,
            Kind::NoBody => true,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::NoBody => Ok(()),

            Kind::Length(remaining) => {
                let PayloadItem::Chunk(bytes) = item else {
                    return Ok(());
                };
                let len = bytes.remaining() as u64;
                if len > *remaining {
                    warn!(len, remaining = *remaining, "payload exceeds the declared content-length");
                    return Err(SendError::invalid_body("payload exceeds the declared content-length"));
                }
                *remaining -= len;
                dst.put(bytes);
                Ok(())
            }

            Kind::Chunked { eof: true } => Ok(()),

            Kind::Chunked { eof } => match item {
                PayloadItem::Chunk(bytes) => {
                    if !bytes.has_remaining() {
                        return Ok(());
                    }
                    write!(Writer(dst), "{:X}\r\n", bytes.remaining())?;
                    dst.put(bytes);
                    dst.extend_from_slice(b"\r\n");
                    Ok(())
                }
                PayloadItem::Eof => {
                    *eof = true;
                    dst.extend_from_slice(b"0\r\n\r\n");
                    Ok(())
                }
            },
        }
    }
}

struct Writer<'a>(&'a mut BytesMut);

impl std::io::Write for Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_chunked() {
        let mut encoder = PayloadEncoder::from(PayloadSize::Chunked);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello world!")), &mut dst).unwrap();
        assert!(!encoder.is_finish());
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(encoder.is_finish());

        assert_eq!(&dst[..], b"C\r\nhello world!\r\n0\r\n\r\n");
    }

    #[test]
    fn test_length() {
        let mut encoder = PayloadEncoder::from(PayloadSize::Length(5));
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hel")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"lo")), &mut dst).unwrap();
        assert!(encoder.is_finish());
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"!")), &mut dst).is_err());

        assert_eq!(&dst[..], b"hello");
    }
}
