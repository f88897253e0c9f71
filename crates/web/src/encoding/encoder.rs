use crate::body::ResponseBody;
use crate::config::PipelineConfig;
use crate::decorator::Decorator;
use crate::encoding::{ContentCoding, Writer, negotiate};
use crate::error::EdgeError;
use crate::handler::RequestHandler;
use crate::request::EdgeRequest;
use crate::stage::merge_vary;
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use edge_http::protocol::{HttpError, SendError};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderValue, Method, Response, StatusCode};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::fmt::Debug;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tracing::{error, trace, warn};
use zstd::stream::write::Encoder as ZstdEncoder;
// (almost thanks and) copy from actix-http: https://github.com/actix/actix-web/blob/master/actix-http/src/encoding/encoder.rs

/// Represents different types of content encoding.
pub(crate) enum Encoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
    Zstd(ZstdEncoder<'static, Writer>),
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    fn new(coding: ContentCoding) -> io::Result<Self> {
        let encoder = match coding {
            ContentCoding::Gzip => Self::Gzip(GzEncoder::new(Writer::new(), Compression::default())),
            ContentCoding::Deflate => Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::default())),
            ContentCoding::Zstd => Self::Zstd(ZstdEncoder::new(Writer::new(), 6)?),
            ContentCoding::Br => Self::Br(Box::new(brotli::CompressorWriter::new(
                Writer::new(),
                32 * 1024, // 32 KiB buffer
                3,         // BROTLI_PARAM_QUALITY
                22,        // BROTLI_PARAM_LGWIN
            ))),
        };
        Ok(encoder)
    }

    fn name(&self) -> &'static str {
        match self {
            Encoder::Gzip(_) => "gzip",
            Encoder::Deflate(_) => "deflate",
            Encoder::Zstd(_) => "zstd",
            Encoder::Br(_) => "br",
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        let result = match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Zstd(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        };
        if let Err(err) = &result {
            trace!(encoding = self.name(), cause = %err, "error encoding response body");
        }
        result
    }

    /// Takes the encoded data produced so far.
    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
            Self::Zstd(encoder) => encoder.get_mut().take(),
            Self::Br(encoder) => encoder.get_mut().take(),
        }
    }

    /// Finishes the stream and returns the remaining encoded data.
    fn finish(self) -> Result<Bytes, io::Error> {
        let writer = match self {
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Deflate(encoder) => encoder.finish()?,
            Self::Zstd(encoder) => encoder.finish()?,
            Self::Br(mut encoder) => {
                encoder.flush()?;
                encoder.into_inner()
            }
        };
        Ok(writer.into_bytes())
    }
}

pin_project! {
    /// A wrapper around a `Body` that encodes the data.
    struct EncodedBody<B: Body> {
        #[pin]
        inner: B,
        encoder: Option<Encoder>,
    }
}

impl<B: Body> EncodedBody<B> {
    fn new(b: B, encoder: Encoder) -> Self {
        Self { inner: b, encoder: Some(encoder) }
    }
}

impl<B> Body for EncodedBody<B>
where
    B: Body,
    B::Data: Buf + Debug,
    B::Error: ToString,
{
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            // the encoder is taken once the inner body ends
            let Some(encoder) = this.encoder.as_mut() else {
                return Poll::Ready(None);
            };

            return match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let data = match frame.into_data() {
                        Ok(data) => data,
                        Err(mut frame) => {
                            let debug_info = frame.trailers_mut();
                            error!("want to data from body, but receive trailer header: {:?}", debug_info);
                            return Poll::Ready(Some(
                                Err(SendError::invalid_body(format!("invalid body frame : {:?}", debug_info)).into()),
                            ));
                        }
                    };

                    if let Err(e) = encoder.write(data.chunk()) {
                        return Poll::Ready(Some(Err(SendError::from(e).into())));
                    }
                    let bytes = encoder.take();
                    if bytes.is_empty() {
                        continue;
                    }
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }
                Some(Err(e)) => Poll::Ready(Some(Err(SendError::invalid_body(e.to_string()).into()))),
                None => {
                    let Some(encoder) = this.encoder.take() else {
                        return Poll::Ready(None);
                    };
                    match encoder.finish() {
                        Ok(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                        Ok(_) => Poll::Ready(None),
                        Err(e) => Poll::Ready(Some(Err(SendError::from(e).into()))),
                    }
                }
            };
        }
    }

    fn is_end_stream(&self) -> bool {
        self.encoder.is_none()
    }
}

/// A request handler that compresses the response body.
pub struct EncodeRequestHandler<H> {
    handler: H,
    threshold: usize,
}

/// Wraps a handler into an [`EncodeRequestHandler`].
#[derive(Debug, Clone)]
pub struct EncodeDecorator {
    threshold: usize,
}

impl EncodeDecorator {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { threshold: config.compression_threshold }
    }
}

impl<H: RequestHandler> Decorator<H> for EncodeDecorator {
    type Out = EncodeRequestHandler<H>;

    fn decorate(&self, raw: H) -> Self::Out {
        EncodeRequestHandler { handler: raw, threshold: self.threshold }
    }
}

#[async_trait]
impl<H: RequestHandler> RequestHandler for EncodeRequestHandler<H> {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        let mut resp = self.handler.invoke(req).await?;
        encode(req, &mut resp, self.threshold);
        Ok(resp)
    }
}

/// Encodes the response body based on the `Accept-Encoding` header.
fn encode(req: &EdgeRequest, resp: &mut Response<ResponseBody>, threshold: usize) {
    let status_code = resp.status();
    if status_code.is_informational() || status_code == StatusCode::NO_CONTENT || status_code == StatusCode::NOT_MODIFIED {
        return;
    }

    if req.method() == Method::HEAD {
        return;
    }

    // response has already encoded
    if resp.headers().contains_key(CONTENT_ENCODING) {
        return;
    }

    let Some(coding) = req.headers().get(ACCEPT_ENCODING).and_then(|value| value.to_str().ok()).and_then(negotiate)
    else {
        return;
    };

    let body = resp.body_mut();
    if body.is_empty() {
        return;
    }
    match body.size_hint().exact() {
        Some(size) if size < threshold as u64 => {
            trace!(size, threshold, "response body below compression threshold");
            return;
        }
        _ => (),
    }

    let encoder = match Encoder::new(coding) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!(encoding = coding.as_str(), cause = %e, "failed to create encoder, send uncompressed");
            return;
        }
    };

    let encoded_body = EncodedBody::new(body.take(), encoder);
    body.replace(ResponseBody::stream(encoded_body));

    let headers = resp.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static(coding.as_str()));
    merge_vary(headers, "Accept-Encoding");
}
