//! Decodes request bodies according to their content type.
//!
//! Only `POST`, `PUT` and `PATCH` bodies are decoded. A body that cannot be
//! decoded ends the request with `400 Bad Request`, one that exceeds its
//! limit with `413 Payload Too Large`. Unknown content types keep the raw
//! bytes only.

use crate::config::{BodyLimits, PipelineConfig};
use crate::error::EdgeError;
use crate::request::{DecodedBody, EdgeRequest};
use crate::stage::{Outcome, Stage, multipart};
use async_trait::async_trait;
use http::Method;
use http::header::CONTENT_TYPE;
use mime::Mime;
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct BodyDecoder {
    limits: BodyLimits,
    json_strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Text,
    Multipart,
}

impl BodyDecoder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self { limits: config.body_limits, json_strict: config.json_strict }
    }

    fn limit(&self, kind: BodyKind) -> usize {
        match kind {
            BodyKind::Json => self.limits.json,
            BodyKind::Form => self.limits.form,
            BodyKind::Text => self.limits.text,
            BodyKind::Multipart => self.limits.multipart,
        }
    }

    fn decode_json(&self, raw: &[u8]) -> Result<DecodedBody, EdgeError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(DecodedBody::Json(Value::Object(Map::new())));
        }

        let value: Value = serde_json::from_slice(raw).map_err(|e| {
            debug!(cause = %e, "invalid json body");
            EdgeError::bad_request(e)
        })?;

        if self.json_strict && !(value.is_object() || value.is_array()) {
            return Err(EdgeError::bad_request("json body must be an object or an array"));
        }
        Ok(DecodedBody::Json(value))
    }
}

fn body_kind(mime: &Mime) -> Option<BodyKind> {
    match (mime.type_(), mime.subtype(), mime.suffix()) {
        (mime::APPLICATION, mime::JSON, _) | (mime::APPLICATION, _, Some(mime::JSON)) => Some(BodyKind::Json),
        (mime::APPLICATION, mime::WWW_FORM_URLENCODED, _) => Some(BodyKind::Form),
        (mime::TEXT, mime::PLAIN, _) => Some(BodyKind::Text),
        (mime::MULTIPART, mime::FORM_DATA, _) => Some(BodyKind::Multipart),
        _ => None,
    }
}

/// Whether an unparsable content-type still names a multipart or json body.
fn requires_decoding(content_type: &[u8]) -> bool {
    let essence = String::from_utf8_lossy(content_type);
    let essence = essence.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence.starts_with("multipart/") || essence == "application/json" || essence.ends_with("+json")
}

#[async_trait]
impl Stage for BodyDecoder {
    fn name(&self) -> &'static str {
        "body-decoder"
    }

    async fn on_request(&self, req: &mut EdgeRequest) -> Result<Outcome, EdgeError> {
        if !matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
            return Ok(Outcome::Continue);
        }

        let Some(content_type) = req.headers().get(CONTENT_TYPE) else {
            return Ok(Outcome::Continue);
        };
        let mime = match content_type.to_str().ok().and_then(|value| value.parse::<Mime>().ok()) {
            Some(mime) => mime,
            None if requires_decoding(content_type.as_bytes()) => {
                debug!(content_type = ?content_type, "malformed content-type for a decoded body");
                return Err(EdgeError::bad_request("malformed content-type"));
            }
            None => {
                warn!(content_type = ?content_type, "unparsable content-type, body kept raw");
                return Ok(Outcome::Continue);
            }
        };
        let Some(kind) = body_kind(&mime) else {
            return Ok(Outcome::Continue);
        };

        let raw = req.raw_body().clone();
        let limit = self.limit(kind);
        if raw.len() > limit {
            debug!(size = raw.len(), limit, ?kind, "request body exceeds limit");
            return Err(EdgeError::payload_too_large(limit));
        }

        let decoded = match kind {
            BodyKind::Json => self.decode_json(&raw)?,
            BodyKind::Form => {
                let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&raw).map_err(EdgeError::bad_request)?;
                DecodedBody::Form(pairs)
            }
            BodyKind::Text => {
                let text = String::from_utf8(raw.to_vec()).map_err(|_| EdgeError::bad_request("text body is not utf-8"))?;
                DecodedBody::Text(text)
            }
            BodyKind::Multipart => {
                let boundary = mime
                    .get_param(mime::BOUNDARY)
                    .ok_or_else(|| EdgeError::bad_request("multipart body without boundary"))?;
                DecodedBody::Multipart(multipart::parse(&raw, boundary.as_str())?)
            }
        };

        req.set_decoded_body(decoded);
        Ok(Outcome::Continue)
    }
}
