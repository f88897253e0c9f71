//! Pipeline stages.
//!
//! A [`Stage`] has two phases. The request phase runs in registration order
//! and may end the chain early with a response of its own or with an error.
//! The response phase runs for every stage, in reverse order, whichever way
//! the terminal response was produced. It may only touch headers: once a body
//! is set nothing after it replaces the body.

pub mod body_decoder;
pub mod cors;
mod multipart;
pub mod security_headers;
pub mod static_files;

use crate::body::ResponseBody;
use crate::error::EdgeError;
use crate::request::EdgeRequest;
use async_trait::async_trait;
use http::header::VARY;
use http::{HeaderMap, HeaderValue, Response};
use tracing::trace;

/// What the request phase of a stage decided.
#[derive(Debug)]
pub enum Outcome {
    Continue,
    Handled(Response<ResponseBody>),
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_request(&self, _req: &mut EdgeRequest) -> Result<Outcome, EdgeError> {
        Ok(Outcome::Continue)
    }

    fn on_response(&self, _req: &EdgeRequest, _resp: &mut Response<ResponseBody>) {}
}

/// An ordered list of stages.
pub struct Stages {
    inner: Vec<Box<dyn Stage>>,
}

impl Stages {
    pub fn builder() -> StagesBuilder {
        StagesBuilder::new()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.iter().map(|stage| stage.name())
    }

    /// Runs request phases in order until one of them does not continue.
    pub async fn on_request(&self, req: &mut EdgeRequest) -> Result<Outcome, EdgeError> {
        for stage in self.inner.iter() {
            match stage.on_request(req).await? {
                Outcome::Continue => continue,
                handled @ Outcome::Handled(_) => {
                    trace!(stage = stage.name(), "request handled by stage");
                    return Ok(handled);
                }
            }
        }
        Ok(Outcome::Continue)
    }

    /// Runs every response phase, last registered first.
    pub fn on_response(&self, req: &EdgeRequest, resp: &mut Response<ResponseBody>) {
        for stage in self.inner.iter().rev() {
            stage.on_response(req, resp);
        }
    }
}

impl std::fmt::Debug for Stages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

pub struct StagesBuilder {
    inner: Vec<Box<dyn Stage>>,
}

impl std::fmt::Debug for StagesBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.iter().map(|stage| stage.name())).finish()
    }
}

impl StagesBuilder {
    fn new() -> Self {
        Self { inner: vec![] }
    }

    pub fn add_last<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.inner.push(Box::new(stage));
        self
    }

    pub fn build(self) -> Stages {
        Stages { inner: self.inner }
    }
}

/// Adds `token` to the `Vary` header unless it is already listed.
pub(crate) fn merge_vary(headers: &mut HeaderMap, token: &'static str) {
    let existing: Vec<String> = headers
        .get_all(VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if existing.iter().any(|item| item == "*" || item.eq_ignore_ascii_case(token)) {
        return;
    }

    if existing.is_empty() {
        headers.insert(VARY, HeaderValue::from_static(token));
        return;
    }

    let merged = format!("{}, {token}", existing.join(", "));
    match HeaderValue::from_str(&merged) {
        Ok(value) => {
            headers.insert(VARY, value);
        }
        Err(_) => {
            headers.append(VARY, HeaderValue::from_static(token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        handle: bool,
    }

    #[async_trait]
    impl Stage for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn on_request(&self, _req: &mut EdgeRequest) -> Result<Outcome, EdgeError> {
            self.log.lock().unwrap().push(format!("req {}", self.name));
            if self.handle { Ok(Outcome::Handled(Response::new(ResponseBody::empty()))) } else { Ok(Outcome::Continue) }
        }

        fn on_response(&self, _req: &EdgeRequest, _resp: &mut Response<ResponseBody>) {
            self.log.lock().unwrap().push(format!("resp {}", self.name));
        }
    }

    #[tokio::test]
    async fn test_short_circuit_and_reverse_response() {
        let log = Arc::new(Mutex::new(vec![]));
        let stage = |name, handle| Recording { name, log: log.clone(), handle };
        let stages = Stages::builder().add_last(stage("a", false)).add_last(stage("b", true)).add_last(stage("c", false)).build();

        assert_eq!(stages.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let mut req: EdgeRequest = Request::builder().body(Bytes::new()).unwrap().into();
        let outcome = stages.on_request(&mut req).await.unwrap();
        assert!(matches!(outcome, Outcome::Handled(_)));

        let mut resp = Response::new(ResponseBody::empty());
        stages.on_response(&req, &mut resp);

        assert_eq!(*log.lock().unwrap(), vec!["req a", "req b", "resp c", "resp b", "resp a"]);
    }

    #[test]
    fn test_merge_vary() {
        let mut headers = HeaderMap::new();
        merge_vary(&mut headers, "Origin");
        merge_vary(&mut headers, "Origin");
        assert_eq!(headers.get(VARY).unwrap(), "Origin");

        merge_vary(&mut headers, "Accept-Encoding");
        assert_eq!(headers.get(VARY).unwrap(), "Origin, Accept-Encoding");
        assert_eq!(headers.get_all(VARY).iter().count(), 1);

        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("*"));
        merge_vary(&mut headers, "Origin");
        assert_eq!(headers.get(VARY).unwrap(), "*");
    }
}
