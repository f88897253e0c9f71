//! The edge server middleware pipeline.
//!
//! Every request runs through a fixed sequence of stages before it reaches the
//! application router: body decoding, static files, CORS, JSON pretty
//! printing, security headers and, in production, compression. See
//! [`pipeline`] for the exact order and how responses travel back.
//!
//! # Example
//!
//! ```no_run
//! use edge_web::config::PipelineConfig;
//! use edge_web::router::{Router, get};
//! use edge_web::{EdgeRequest, Server, handler_fn, pipeline};
//! use futures::FutureExt;
//! use futures::future::BoxFuture;
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! fn ping(_req: &EdgeRequest) -> BoxFuture<'_, Value> {
//!     async { json!({"pong": true}) }.boxed()
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::builder().route("/api/ping", get(handler_fn(ping))).build()?;
//!     let handler = pipeline::build(Arc::new(PipelineConfig::default()), router);
//!
//!     Server::builder().address("127.0.0.1:3000".parse()?).handler(handler).build()?.start().await?;
//!     Ok(())
//! }
//! ```

mod body;
mod date;
mod error;
mod handler;
mod request;
mod responder;
mod server;

pub mod config;
pub mod decorator;
pub mod encoding;
pub mod pipeline;
pub mod pretty;
pub mod router;
pub mod stage;

pub use body::ResponseBody;
pub use error::{BoxError, EdgeError};
pub use handler::{FnHandler, RequestHandler, handler_fn};
pub use pipeline::EdgeHandler;
pub use request::{DecodedBody, EdgeRequest, FilePart, MultipartForm};
pub use responder::Responder;
pub use router::Router;
pub use server::{Server, ServerBuilder, ServerError};
