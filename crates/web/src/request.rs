//! The request as the pipeline sees it.
//!
//! An [`EdgeRequest`] owns the request head, the raw body bytes and, once the
//! body decoder has run, the decoded body. The router fills in path
//! parameters before a route handler is invoked.

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use serde_json::Value;

/// A body decoded according to the request content type.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
    Multipart(MultipartForm),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn file(&self, field_name: &str) -> Option<&FilePart> {
        self.files.iter().find(|file| file.field_name == field_name)
    }
}

/// An uploaded file, kept in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct EdgeRequest {
    parts: Parts,
    raw_body: Bytes,
    decoded_body: Option<DecodedBody>,
    path_params: Vec<(String, String)>,
}

impl From<Request<Bytes>> for EdgeRequest {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, raw_body) = request.into_parts();
        Self { parts, raw_body, decoded_body: None, path_params: vec![] }
    }
}

impl EdgeRequest {
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    pub fn decoded_body(&self) -> Option<&DecodedBody> {
        self.decoded_body.as_ref()
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.decoded_body {
            Some(DecodedBody::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn set_decoded_body(&mut self, decoded_body: DecodedBody) {
        self.decoded_body = Some(decoded_body);
    }

    /// Whether the query string carries `name`, with or without a value.
    pub fn has_query_param(&self, name: &str) -> bool {
        let Some(query) = self.uri().query() else {
            return false;
        };

        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(pairs) => pairs.iter().any(|(key, _)| key == name),
            Err(_) => query.split('&').any(|pair| pair.split('=').next() == Some(name)),
        }
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub(crate) fn set_path_params(&mut self, path_params: Vec<(String, String)>) {
        self.path_params = path_params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> EdgeRequest {
        Request::builder().uri(uri).body(Bytes::new()).unwrap().into()
    }

    #[test]
    fn test_query_param_without_value() {
        assert!(request("/api?pretty").has_query_param("pretty"));
        assert!(request("/api?a=1&pretty=false").has_query_param("pretty"));
        assert!(request("/api?a=1&pretty=").has_query_param("pretty"));
    }

    #[test]
    fn test_query_param_absent() {
        assert!(!request("/api").has_query_param("pretty"));
        assert!(!request("/api?prettyx=1").has_query_param("pretty"));
        assert!(!request("/api?a=pretty").has_query_param("pretty"));
    }

    #[test]
    fn test_multipart_lookup() {
        let form = MultipartForm {
            fields: vec![("title".into(), "hello".into())],
            files: vec![FilePart {
                field_name: "upload".into(),
                file_name: "a.txt".into(),
                content_type: Some("text/plain".into()),
                data: Bytes::from_static(b"abc"),
            }],
        };

        assert_eq!(form.field("title"), Some("hello"));
        assert_eq!(form.file("upload").unwrap().file_name, "a.txt");
        assert!(form.field("missing").is_none());
    }
}
