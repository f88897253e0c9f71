//! The terminal handler of the pipeline.
//!
//! Routes are matched with `matchit`. Several handlers may share one route;
//! the first one whose filter accepts the request is invoked. A path nobody
//! registered, or a request no filter accepts, ends with `404 Not Found`.

pub mod filter;

use crate::body::ResponseBody;
use crate::error::EdgeError;
use crate::handler::RequestHandler;
use crate::request::EdgeRequest;
use async_trait::async_trait;
use filter::{AllFilter, Filter};
use http::Response;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace};

type RouterFilter = dyn Filter + Send + Sync + 'static;
type InnerRouter<T> = matchit::Router<T>;

pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

/// A handler together with the filter guarding it.
pub struct RouterItem {
    filter: Box<RouterFilter>,
    handler: Box<dyn RequestHandler>,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route {route}: {source}")]
    InvalidRoute {
        route: String,
        #[source]
        source: matchit::InsertError,
    },
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Finds the handler for `req` together with the captured path parameters.
    fn route(&self, req: &EdgeRequest) -> Option<(&dyn RequestHandler, Vec<(String, String)>)> {
        let matched = match self.inner_router.at(req.uri().path()) {
            Ok(matched) => matched,
            Err(e) => {
                trace!(path = req.uri().path(), cause = %e, "no route");
                return None;
            }
        };

        let item = matched.value.iter().find(|item| item.filter.matches(req))?;
        let params = matched.params.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
        Some((item.handler.as_ref(), params))
    }
}

#[async_trait]
impl RequestHandler for Router {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        let Some((handler, params)) = self.route(req) else {
            debug!(method = %req.method(), path = req.uri().path(), "no handler matched");
            return Err(EdgeError::NotFound);
        };
        req.set_path_params(params);
        handler.invoke(req).await
    }
}

pub struct RouterBuilder {
    data: HashMap<String, Vec<RouterItemBuilder>>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { data: HashMap::new() }
    }

    pub fn route(mut self, route: impl Into<String>, item_builder: RouterItemBuilder) -> Self {
        self.data.entry(route.into()).or_default().push(item_builder);
        self
    }

    pub fn build(self) -> Result<Router, RouterError> {
        let mut inner_router = InnerRouter::new();

        for (path, items) in self.data.into_iter() {
            let router_items = items.into_iter().map(|item_builder| item_builder.build()).collect::<Vec<_>>();

            inner_router
                .insert(path.clone(), router_items)
                .map_err(|source| RouterError::InvalidRoute { route: path, source })?;
        }

        Ok(Router { inner_router })
    }
}

macro_rules! method_router_filter {
    ($method:ident, $method_name:ident) => {
        pub fn $method<H: RequestHandler + 'static>(handler: H) -> RouterItemBuilder {
            let mut filters = filter::all_filter();
            filters.and(filter::$method_name());
            RouterItemBuilder { filters, handler: Box::new(handler) }
        }
    };
}

method_router_filter!(get, get_method);
method_router_filter!(post, post_method);
method_router_filter!(put, put_method);
method_router_filter!(delete, delete_method);
method_router_filter!(head, head_method);
method_router_filter!(options, options_method);
method_router_filter!(patch, patch_method);

pub struct RouterItemBuilder {
    filters: AllFilter,
    handler: Box<dyn RequestHandler>,
}

impl RouterItemBuilder {
    pub fn with<F: Filter + Send + Sync + 'static>(mut self, filter: F) -> Self {
        self.filters.and(filter);
        self
    }

    fn build(self) -> RouterItem {
        RouterItem { filter: Box::new(self.filters), handler: self.handler }
    }
}
