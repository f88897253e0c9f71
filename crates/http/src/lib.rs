//! HTTP/1.x transport for the edge server.
//!
//! This crate owns the wire: it accepts a byte stream, decodes complete
//! requests, hands them to a [`handler::Handler`] and writes the responses back
//! in order. It knows nothing about the edge pipeline itself.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use edge_http::connection::HttpConnection;
//! use edge_http::handler::make_handler;
//! use http::{Request, Response};
//! use http_body_util::Full;
//! use std::error::Error;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!     let handler = Arc::new(make_handler(hello));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = listener.accept().await.unwrap();
//!         let handler = handler.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             match HttpConnection::new(reader, writer).process(handler).await {
//!                 Ok(_) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!("service has error, cause {}, connection shutdown", e),
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello(request: Request<Bytes>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.uri().path(), body_size = request.body().len(), "receive request");
//!     Ok(Response::new(Full::new(Bytes::from_static(b"Hello World!"))))
//! }
//! ```
//!
//! # Modules
//!
//! - [`connection`]: the per-connection loop, keep-alive and pipelining
//! - [`codec`]: request decoding and response encoding
//! - [`handler`]: the handler trait
//! - [`protocol`]: shared message and error types
//!
//! # Limits
//!
//! - HTTP/1.0 and HTTP/1.1 only, no TLS
//! - Maximum header block: 8KB, at most 64 headers
//! - Request bodies are buffered up to 256MB by default
//! - `Expect: 100-continue` is not answered with an interim response

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
