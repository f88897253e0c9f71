//! JSON rendering of route responses.
//!
//! [`PrettyJsonDecorator`] wraps the router only, so static files and error
//! responses never pass through it. A request carrying the configured query
//! parameter, with or without a value, gets indented JSON.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Response};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::{trace, warn};

use crate::body::ResponseBody;
use crate::config::PipelineConfig;
use crate::decorator::Decorator;
use crate::error::EdgeError;
use crate::handler::RequestHandler;
use crate::request::EdgeRequest;

#[derive(Debug, Clone)]
pub struct PrettyJsonDecorator {
    config: Arc<PipelineConfig>,
}

impl PrettyJsonDecorator {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl<H: RequestHandler> Decorator<H> for PrettyJsonDecorator {
    type Out = PrettyJsonHandler<H>;

    fn decorate(&self, raw: H) -> Self::Out {
        PrettyJsonHandler { handler: raw, param: self.config.pretty_param.clone(), indent: " ".repeat(self.config.pretty_spaces) }
    }
}

pub struct PrettyJsonHandler<H> {
    handler: H,
    param: String,
    indent: String,
}

impl<H> PrettyJsonHandler<H> {
    fn render(&self, value: &Value, pretty: bool) -> Result<Vec<u8>, serde_json::Error> {
        if !pretty {
            return serde_json::to_vec(value);
        }

        let mut buf = Vec::with_capacity(128);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(self.indent.as_bytes()));
        value.serialize(&mut serializer)?;
        Ok(buf)
    }

    fn shape(&self, resp: &mut Response<ResponseBody>, pretty: bool) -> Result<(), EdgeError> {
        if let Some(value) = resp.body_mut().take_json() {
            let rendered = self.render(&value, pretty).map_err(EdgeError::internal)?;
            *resp.body_mut() = ResponseBody::from(rendered);
            resp.headers_mut()
                .entry(CONTENT_TYPE)
                .or_insert_with(|| HeaderValue::from_static("application/json; charset=utf-8"));
            return Ok(());
        }

        if !pretty || !declares_json(resp.headers()) {
            return Ok(());
        }
        let Some(bytes) = resp.body().as_bytes() else {
            return Ok(());
        };

        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => {
                let rendered = self.render(&value, true).map_err(EdgeError::internal)?;
                *resp.body_mut() = ResponseBody::from(rendered);
            }
            Err(e) => trace!(cause = %e, "json response does not parse, left as is"),
        }
        Ok(())
    }
}

fn declares_json(headers: &HeaderMap) -> bool {
    let Some(mime) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).and_then(|v| v.parse::<mime::Mime>().ok())
    else {
        return false;
    };
    mime.type_() == mime::APPLICATION && (mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON))
}

#[async_trait]
impl<H: RequestHandler> RequestHandler for PrettyJsonHandler<H> {
    async fn invoke(&self, req: &mut EdgeRequest) -> Result<Response<ResponseBody>, EdgeError> {
        let mut resp = self.handler.invoke(req).await?;
        let pretty = req.has_query_param(&self.param);
        if let Err(e) = self.shape(&mut resp, pretty) {
            warn!(cause = %e, "failed to render json response");
            return Err(e);
        }
        Ok(resp)
    }
}

impl<H> std::fmt::Debug for PrettyJsonHandler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyJsonHandler").field("param", &self.param).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockRequestHandler;
    use bytes::Bytes;
    use http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn pretty_handler(reply: fn() -> Response<ResponseBody>) -> PrettyJsonHandler<MockRequestHandler> {
        let mut router = MockRequestHandler::new();
        router.expect_invoke().returning(move |_| Ok(reply()));
        PrettyJsonDecorator::new(Arc::new(PipelineConfig::default())).decorate(router)
    }

    async fn call(handler: &PrettyJsonHandler<MockRequestHandler>, uri: &str) -> (Response<()>, Bytes) {
        let mut req: EdgeRequest = Request::builder().uri(uri).body(Bytes::new()).unwrap().into();
        let (parts, body) = handler.invoke(&mut req).await.unwrap().into_parts();
        (Response::from_parts(parts, ()), body.collect().await.unwrap().to_bytes())
    }

    fn json_reply() -> Response<ResponseBody> {
        Response::new(ResponseBody::json(json!({"name": "edge", "tags": [1, 2]})))
    }

    #[tokio::test]
    async fn test_compact_by_default() {
        let (head, body) = call(&pretty_handler(json_reply), "/api/item").await;

        assert_eq!(head.headers().get(CONTENT_TYPE).unwrap(), "application/json; charset=utf-8");
        assert_eq!(body, Bytes::from_static(br#"{"name":"edge","tags":[1,2]}"#));
    }

    #[tokio::test]
    async fn test_pretty_keeps_value() {
        let handler = pretty_handler(json_reply);
        let (_, compact) = call(&handler, "/api/item").await;
        let (_, pretty) = call(&handler, "/api/item?pretty").await;

        assert!(pretty.starts_with(b"{\n  \"name\""));
        assert_eq!(
            serde_json::from_slice::<Value>(&pretty).unwrap(),
            serde_json::from_slice::<Value>(&compact).unwrap()
        );
    }

    #[tokio::test]
    async fn test_reindents_serialized_json() {
        let handler = pretty_handler(|| {
            Response::builder().header(CONTENT_TYPE, "application/problem+json").body(ResponseBody::from(r#"{"a":1}"#)).unwrap()
        });
        let (_, body) = call(&handler, "/api/item?pretty=1").await;
        assert_eq!(body, Bytes::from_static(b"{\n  \"a\": 1\n}"));
    }

    #[tokio::test]
    async fn test_leaves_other_bodies_alone() {
        let handler = pretty_handler(|| {
            Response::builder().header(CONTENT_TYPE, "text/plain").body(ResponseBody::from(r#"{"a":1}"#)).unwrap()
        });
        let (_, body) = call(&handler, "/api/item?pretty").await;
        assert_eq!(body, Bytes::from_static(br#"{"a":1}"#));

        let handler = pretty_handler(|| {
            Response::builder().header(CONTENT_TYPE, "application/json").body(ResponseBody::from("{broken")).unwrap()
        });
        let (_, body) = call(&handler, "/api/item?pretty").await;
        assert_eq!(body, Bytes::from_static(b"{broken"));
    }

    #[tokio::test]
    async fn test_keeps_declared_content_type() {
        let handler = pretty_handler(|| {
            let mut resp = json_reply();
            resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.edge+json"));
            resp
        });
        let (head, _) = call(&handler, "/api/item").await;
        assert_eq!(head.headers().get(CONTENT_TYPE).unwrap(), "application/vnd.edge+json");
    }
}
