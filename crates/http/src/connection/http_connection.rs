use std::error::Error;
use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, ResponseHead, SendError};

/// An HTTP/1.x connection.
///
/// Requests are answered strictly in arrival order. While a handler runs the
/// connection keeps reading, so that one pipelined request can be buffered and
/// a peer that goes away is noticed: on end of stream the in-flight handler
/// future is dropped and the connection ends without writing anything.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    pending: Option<Result<Request<Bytes>, ParseError>>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_decoder(reader, writer, RequestDecoder::new())
    }

    pub fn with_decoder(reader: R, writer: W, decoder: RequestDecoder) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            pending: None,
        }
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            let next = match self.pending.take() {
                Some(next) => next,
                None => match self.framed_read.next().await {
                    Some(next) => next,
                    None => {
                        info!("can't read more request, break this connection down");
                        return Ok(());
                    }
                },
            };

            let request = match next {
                Ok(request) => request,
                Err(e) => {
                    warn!(cause = %e, "can't decode request");
                    let status = match e {
                        ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                        _ => StatusCode::BAD_REQUEST,
                    };
                    self.do_send_response(build_error_response(status), false, false).await?;
                    return Err(e.into());
                }
            };

            let keep_alive = wants_keep_alive(&request);
            let is_head = request.method() == Method::HEAD;
            let version = request.version();
            debug!(method = %request.method(), uri = %request.uri(), "receive request");

            let response_result = {
                let handle = handler.call(request);
                tokio::pin!(handle);

                loop {
                    select! {
                        biased;
                        response = &mut handle => break response,
                        next = self.framed_read.next(), if self.pending.is_none() => match next {
                            Some(next) => self.pending = Some(next),
                            None => {
                                info!("peer closed while request in flight, dropping handler");
                                return Ok(());
                            }
                        },
                    }
                }
            };

            let keep_alive = match response_result {
                Ok(mut response) => {
                    let keep_alive = keep_alive && !has_token(response.headers().get(CONNECTION), "close");
                    mark_connection(response.headers_mut(), version, keep_alive);
                    self.do_send_response(response, is_head, keep_alive).await?;
                    keep_alive
                }
                Err(e) => {
                    let cause: Box<dyn Error + Send + Sync> = e.into();
                    error!(%cause, "handle response error");
                    let mut response = build_error_response(StatusCode::INTERNAL_SERVER_ERROR);
                    mark_connection(response.headers_mut(), version, keep_alive);
                    self.do_send_response(response, is_head, keep_alive).await?;
                    keep_alive
                }
            };

            if !keep_alive {
                debug!("connection is not keep-alive, close it");
                return Ok(());
            }
        }
    }

    /// Writes one response and flushes it. A failing body stream ends the
    /// connection with an error since the framing can no longer be completed.
    async fn do_send_response<T>(&mut self, response: Response<T>, is_head: bool, keep_alive: bool) -> Result<(), HttpError>
    where
        T: Body<Data = Bytes> + Unpin,
        T::Error: Display,
    {
        let (parts, mut body) = response.into_parts();
        let mut head = ResponseHead::from_parts(parts, ());
        if !keep_alive && !head.headers().contains_key(CONNECTION) {
            head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let size_hint = body.size_hint().exact();
        let status = head.status();
        let skip_body = is_head || status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;

        if skip_body {
            if is_head && !head.headers().contains_key(CONTENT_LENGTH) {
                if let Some(length) = size_hint.filter(|length| *length > 0) {
                    head.headers_mut().insert(CONTENT_LENGTH, length.into());
                }
            }
            self.framed_write.send(Message::<_, Bytes>::Header((head, PayloadSize::Empty))).await?;
            return Ok(());
        }

        // the body alone decides the framing
        head.headers_mut().remove(CONTENT_LENGTH);
        let payload_size = match size_hint {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        };

        self.framed_write.feed(Message::<_, Bytes>::Header((head, payload_size))).await?;
        if payload_size.is_empty() {
            SinkExt::<Message<(ResponseHead, PayloadSize), Bytes>>::flush(&mut self.framed_write).await?;
            return Ok(());
        }

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    // trailers are not written
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    self.framed_write.feed(Message::Payload(PayloadItem::Chunk(data))).await?;
                }
                Some(Err(e)) => {
                    error!(cause = %e, "response body stream failed");
                    return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into());
                }
                None => {
                    self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
                    return Ok(());
                }
            }
        }
    }
}

fn wants_keep_alive(request: &Request<Bytes>) -> bool {
    let connection = request.headers().get(CONNECTION);
    match request.version() {
        Version::HTTP_10 => has_token(connection, "keep-alive"),
        _ => !has_token(connection, "close"),
    }
}

fn has_token(value: Option<&HeaderValue>, token: &str) -> bool {
    value
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
}

fn mark_connection(headers: &mut http::HeaderMap, version: Version, keep_alive: bool) {
    if !keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    } else if version == Version::HTTP_10 {
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    }
}

/// Plain text error response carrying only the canonical reason phrase.
fn build_error_response(status: StatusCode) -> Response<Full<Bytes>> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Full::new(Bytes::from_static(reason.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    type BoxError = Box<dyn Error + Send + Sync>;

    async fn echo(request: Request<Bytes>) -> Result<Response<Full<Bytes>>, BoxError> {
        let body = format!("{} {}", request.uri().path(), String::from_utf8_lossy(request.body()));
        Ok(Response::new(Full::new(Bytes::from(body))))
    }

    async fn run_connection(input: &[u8]) -> String {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            HttpConnection::new(server_read, server_write).process(Arc::new(make_handler(echo))).await
        });

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(input).await.unwrap();

        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        let _ = task.await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_connection_close() {
        let output = run_connection(b"POST /a HTTP/1.1\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi").await;

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.contains("connection: close\r\n"));
        assert!(output.contains("content-length: 5\r\n"));
        assert!(output.ends_with("/a hi"));
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let output = run_connection(
            b"GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\nGET /third HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;

        let first = output.find("/first").unwrap();
        let second = output.find("/second").unwrap();
        let third = output.find("/third").unwrap();
        assert!(first < second && second < third);
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 3);
    }

    #[tokio::test]
    async fn test_http10_closes_by_default() {
        let output = run_connection(b"GET /old HTTP/1.0\r\n\r\nGET /ignored HTTP/1.0\r\n\r\n").await;
        assert!(output.contains("connection: close\r\n"));
        assert!(!output.contains("/ignored"));
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let output = run_connection(b"HEAD /h HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(output.contains("content-length: 3\r\n"));
        assert!(output.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let output = run_connection(b"GET / HTTP/1.1\r\nContent-Length: x\r\n\r\n").await;
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output.ends_with("Bad Request"));
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            HttpConnection::with_decoder(server_read, server_write, RequestDecoder::with_max_body_size(4))
                .process(Arc::new(make_handler(echo)))
                .await
        });

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789").await.unwrap();

        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert!(String::from_utf8(output).unwrap().starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_peer_close_drops_handler() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let handler = make_handler(move |_request: Request<Bytes>| {
            let guard = DropFlag(flag.clone());
            async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BoxError>(Response::new(Full::new(Bytes::new())))
            }
        });

        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(async move { HttpConnection::new(server_read, server_write).process(Arc::new(handler)).await });

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /slow HTTP/1.1\r\n\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(client_write);
        drop(client_read);

        let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(dropped.load(Ordering::SeqCst));
    }
}
