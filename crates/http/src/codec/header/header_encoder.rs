//! Serializes a response head: status line, framing headers and header fields.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, StatusCode, header};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Writes a [`ResponseHead`] and fixes its framing headers to match the [`PayloadSize`].
///
/// The status line is always `HTTP/1.1`, which HTTP/1.0 clients accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;
        let status = head.status();

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty => {
                // a HEAD response keeps the length its GET twin would carry
                if !headers.contains_key(header::CONTENT_LENGTH) && !forbids_content_length(status) {
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                }
            }
        }

        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn forbids_content_length(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;

    fn encode(head: ResponseHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn test_length() {
        let head = Response::builder().status(200).header("content-type", "text/plain").body(()).unwrap();
        let out = encode(head, PayloadSize::Length(12));

        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("content-type: text/plain\r\n"));
        assert!(out.contains("content-length: 12\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_chunked_drops_content_length() {
        let head = Response::builder().header("content-length", "99").body(()).unwrap();
        let out = encode(head, PayloadSize::Chunked);

        assert!(out.contains("transfer-encoding: chunked\r\n"));
        assert!(!out.contains("content-length"));
    }

    #[test]
    fn test_empty() {
        let out = encode(Response::builder().status(404).body(()).unwrap(), PayloadSize::Empty);
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("content-length: 0\r\n"));

        let out = encode(Response::builder().status(204).body(()).unwrap(), PayloadSize::Empty);
        assert!(!out.contains("content-length"));
    }

    #[test]
    fn test_empty_keeps_head_length() {
        let head = Response::builder().header("content-length", "42").body(()).unwrap();
        let out = encode(head, PayloadSize::Empty);
        assert!(out.contains("content-length: 42\r\n"));
    }
}
