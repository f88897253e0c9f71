use crate::body::ResponseBody;
use crate::error::EdgeError;
use crate::request::EdgeRequest;
use crate::responder::Responder;
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::Response;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Anything that turns a request into a response: the router, a route
/// handler, the pipeline itself and every decorator around it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError>;
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for Box<T> {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        self.as_ref().invoke(req).await
    }
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for Arc<T> {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        self.as_ref().invoke(req).await
    }
}

/// A route handler backed by a function returning a boxed future.
pub struct FnHandler<F, R> {
    f: F,
    _phantom: PhantomData<fn() -> R>,
}

/// Creates a [`FnHandler`].
///
/// ```
/// use edge_web::{EdgeRequest, handler_fn};
/// use futures::FutureExt;
/// use futures::future::BoxFuture;
///
/// fn hello(_req: &EdgeRequest) -> BoxFuture<'_, &'static str> {
///     async { "hello" }.boxed()
/// }
///
/// let handler = handler_fn(hello);
/// ```
pub fn handler_fn<F, R>(f: F) -> FnHandler<F, R>
where
    F: for<'r> Fn(&'r EdgeRequest) -> BoxFuture<'r, R> + Send + Sync,
    R: Responder,
{
    FnHandler { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, R> RequestHandler for FnHandler<F, R>
where
    F: for<'r> Fn(&'r EdgeRequest) -> BoxFuture<'r, R> + Send + Sync,
    R: Responder + Send + 'static,
{
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        let responder = (self.f)(&*req).await;
        Ok(responder.response_to(req))
    }
}
