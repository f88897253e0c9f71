//! Response compression.
//!
//! This module negotiates a content coding from `Accept-Encoding` and
//! provides the streaming encoder used by [`encoder::EncodeDecorator`].
//!
//! The main components are:
//! - `Writer`: an internal buffer collecting encoded bytes
//! - [`negotiate`]: picks the coding for a request
//! - `encoder`: the encoding body and the request handler wrapper

use bytes::{Bytes, BytesMut};
use std::io;

pub mod encoder;

/// Codings this server can produce, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Zstd,
    Br,
    Gzip,
    Deflate,
}

impl ContentCoding {
    const PREFERENCE: [ContentCoding; 4] = [ContentCoding::Zstd, ContentCoding::Br, ContentCoding::Gzip, ContentCoding::Deflate];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCoding::Zstd => "zstd",
            ContentCoding::Br => "br",
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }
}

/// Picks the coding with the highest quality value, preferring the server
/// order on ties. `*` covers every coding not listed explicitly and `q=0`
/// excludes a coding.
pub fn negotiate(accept_encoding: &str) -> Option<ContentCoding> {
    let mut explicit: Vec<(String, f32)> = vec![];
    let mut wildcard = None;

    for item in accept_encoding.split(',') {
        let mut params = item.split(';').map(str::trim);
        let Some(name) = params.next().filter(|name| !name.is_empty()) else {
            continue;
        };
        let quality = params
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
            .map_or(Some(1.0), |(_, q)| q.trim().parse::<f32>().ok().filter(|q| (0.0..=1.0).contains(q)))
            .unwrap_or(0.0);

        if name == "*" {
            wildcard = Some(quality);
        } else {
            explicit.push((name.to_ascii_lowercase(), quality));
        }
    }

    let mut chosen: Option<(ContentCoding, f32)> = None;
    for coding in ContentCoding::PREFERENCE {
        let quality = explicit.iter().find(|(name, _)| name == coding.as_str()).map(|(_, q)| *q).or(wildcard);
        match (quality, chosen) {
            (Some(q), None) if q > 0.0 => chosen = Some((coding, q)),
            (Some(q), Some((_, best))) if q > best => chosen = Some((coding, q)),
            _ => {}
        }
    }
    chosen.map(|(coding, _)| coding)
}

// inspired by from actix-http
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_preference() {
        assert_eq!(negotiate("gzip, deflate, br"), Some(ContentCoding::Br));
        assert_eq!(negotiate("deflate, gzip"), Some(ContentCoding::Gzip));
        assert_eq!(negotiate("zstd, gzip"), Some(ContentCoding::Zstd));
    }

    #[test]
    fn test_quality_values() {
        assert_eq!(negotiate("br;q=0.5, gzip;q=0.8"), Some(ContentCoding::Gzip));
        assert_eq!(negotiate("gzip;q=0, deflate"), Some(ContentCoding::Deflate));
        assert_eq!(negotiate("GZIP; Q=0.1"), Some(ContentCoding::Gzip));
    }

    #[test]
    fn test_wildcard() {
        assert_eq!(negotiate("*"), Some(ContentCoding::Zstd));
        assert_eq!(negotiate("zstd;q=0, br;q=0, *;q=0.5"), Some(ContentCoding::Gzip));
        assert_eq!(negotiate("gzip, *;q=0"), Some(ContentCoding::Gzip));
    }

    #[test]
    fn test_nothing_acceptable() {
        assert_eq!(negotiate(""), None);
        assert_eq!(negotiate("identity"), None);
        assert_eq!(negotiate("gzip;q=0"), None);
        assert_eq!(negotiate("compress, sdch"), None);
        assert_eq!(negotiate("gzip;q=abc"), None);
    }
}
