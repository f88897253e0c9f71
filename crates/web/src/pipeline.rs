//! Assembly of the middleware pipeline.
//!
//! The order is fixed:
//!
//! 1. body decoder
//! 2. static files
//! 3. cors
//! 4. pretty json, wrapped around the router so it only sees route output
//! 5. security headers
//! 6. compression, production only, wrapped around everything else
//! 7. router
//!
//! Request phases run top down until a stage answers. Whatever produced the
//! terminal response (a stage, the router or an error) every response phase
//! then runs bottom up, so header stages see every response exactly once.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use edge_http::handler::Handler;
use futures::FutureExt;
use http::header::DATE;
use http::{Request, Response};
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

use crate::body::ResponseBody;
use crate::config::PipelineConfig;
use crate::date::DateService;
use crate::decorator::Decorator;
use crate::encoding::encoder::EncodeDecorator;
use crate::error::EdgeError;
use crate::handler::RequestHandler;
use crate::pretty::{PrettyJsonDecorator, PrettyJsonHandler};
use crate::request::EdgeRequest;
use crate::stage::body_decoder::BodyDecoder;
use crate::stage::cors::Cors;
use crate::stage::security_headers::SecurityHeaders;
use crate::stage::static_files::StaticFiles;
use crate::stage::{Outcome, Stages};

/// Builds the pipeline in front of `router`.
///
/// Whether compression takes part is decided here, once, from the runtime mode.
pub fn build<R>(config: Arc<PipelineConfig>, router: R) -> EdgeHandler
where
    R: RequestHandler + 'static,
{
    let stages = Stages::builder()
        .add_last(BodyDecoder::new(&config))
        .add_last(StaticFiles::new(&config))
        .add_last(Cors::new(&config.cors))
        .add_last(SecurityHeaders)
        .build();

    let mut layout: Vec<&'static str> = stages.names().collect();
    layout.insert(3, "pretty-json");

    let core = StagedHandler { stages, router: PrettyJsonDecorator::new(config.clone()).decorate(router) };

    let inner: Box<dyn RequestHandler> = if config.runtime_mode.is_production() {
        layout.push("compression");
        Box::new(EncodeDecorator::new(config.clone()).decorate(core))
    } else {
        Box::new(core)
    };
    layout.push("router");

    debug!(?layout, mode = ?config.runtime_mode, "pipeline built");
    EdgeHandler { inner, layout }
}

/// The request handler the connection drives.
pub struct EdgeHandler {
    inner: Box<dyn RequestHandler>,
    layout: Vec<&'static str>,
}

impl EdgeHandler {
    /// The effective processing order by stage name.
    pub fn layout(&self) -> &[&'static str] {
        &self.layout
    }
}

impl std::fmt::Debug for EdgeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeHandler").field("layout", &self.layout).finish()
    }
}

#[async_trait]
impl RequestHandler for EdgeHandler {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        let mut resp = self.inner.invoke(req).await.unwrap_or_else(into_response);
        if let Some(date) = DateService::global().http_date() {
            resp.headers_mut().insert(DATE, date);
        }
        Ok(resp)
    }
}

#[async_trait]
impl Handler for EdgeHandler {
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<Self::RespBody>, Self::Error> {
        let mut req = EdgeRequest::from(req);
        let resp = RequestHandler::invoke(self, &mut req).await.unwrap_or_else(into_response);
        Ok(resp)
    }
}

/// Runs the stages around the router.
struct StagedHandler<R> {
    stages: Stages,
    router: PrettyJsonHandler<R>,
}

impl<R: RequestHandler> StagedHandler<R> {
    async fn dispatch(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        match AssertUnwindSafe(self.router.invoke(req)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(EdgeError::internal("route handler panicked")),
        }
    }
}

#[async_trait]
impl<R: RequestHandler> RequestHandler for StagedHandler<R> {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        let terminal = match self.stages.on_request(req).await {
            Ok(Outcome::Handled(resp)) => Ok(resp),
            Ok(Outcome::Continue) => self.dispatch(req).await,
            Err(e) => Err(e),
        };

        let mut resp = terminal.unwrap_or_else(into_response);
        self.stages.on_response(req, &mut resp);
        Ok(resp)
    }
}

fn into_response(e: EdgeError) -> Response<ResponseBody> {
    if e.status().is_server_error() {
        error!(cause = %e, "request failed");
    } else {
        debug!(cause = %e, status = %e.status(), "request rejected");
    }
    e.into_response()
}
