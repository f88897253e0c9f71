//! Serves files below the asset root.
//!
//! A request that does not resolve to a readable file falls through to the
//! next stage. Paths are checked twice: `..` segments that climb above the root
//! are refused before the filesystem is touched, and the canonical path of the target must stay below
//! the canonical asset root so symlinks cannot lead outside of it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use http::{HeaderValue, Method, Response, StatusCode};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::body::ResponseBody;
use crate::config::PipelineConfig;
use crate::error::EdgeError;
use crate::request::EdgeRequest;
use crate::stage::{Outcome, Stage};

#[derive(Debug)]
pub struct StaticFiles {
    root: Option<PathBuf>,
    index_file: String,
}

impl StaticFiles {
    /// A missing asset root disables the stage instead of failing startup.
    pub fn new(config: &PipelineConfig) -> Self {
        let root = match std::fs::canonicalize(&config.asset_root) {
            Ok(root) => Some(root),
            Err(e) => {
                warn!(asset_root = %config.asset_root.display(), cause = %e, "asset root unavailable, static files disabled");
                None
            }
        };
        Self { root, index_file: config.index_file.clone() }
    }

    /// Maps the request path onto the asset root, `None` if it must not be served.
    fn resolve(&self, root: &Path, request_path: &str) -> Result<Option<PathBuf>, EdgeError> {
        let decoded = percent_decode_str(request_path)
            .decode_utf8()
            .map_err(|_| EdgeError::bad_request("request path is not utf-8"))?;
        if decoded.contains('\0') {
            return Err(EdgeError::bad_request("request path contains a nul byte"));
        }

        let mut segments: Vec<&str> = vec![];
        for segment in decoded.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(EdgeError::Forbidden);
                    }
                }
                segment => segments.push(segment),
            }
        }
        if segments.iter().any(|segment| segment.starts_with('.')) {
            return Ok(None);
        }

        let mut path = root.to_path_buf();
        path.extend(segments);

        if decoded.ends_with('/') {
            path.push(&self.index_file);
        }
        Ok(Some(path))
    }

    async fn canonical_file(&self, root: &Path, path: &Path) -> Result<Option<PathBuf>, EdgeError> {
        let Ok(mut canonical) = tokio::fs::canonicalize(path).await else {
            return Ok(None);
        };
        ensure_below(root, &canonical)?;

        if tokio::fs::metadata(&canonical).await.is_ok_and(|metadata| metadata.is_dir()) {
            let Ok(index) = tokio::fs::canonicalize(canonical.join(&self.index_file)).await else {
                return Ok(None);
            };
            ensure_below(root, &index)?;
            canonical = index;
        }
        Ok(Some(canonical))
    }
}

fn ensure_below(root: &Path, path: &Path) -> Result<(), EdgeError> {
    if path.starts_with(root) {
        Ok(())
    } else {
        warn!(path = %path.display(), "static path resolves outside of the asset root");
        Err(EdgeError::Forbidden)
    }
}

fn mime_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|s| s.to_str()) else {
        return "application/octet-stream";
    };
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Stage for StaticFiles {
    fn name(&self) -> &'static str {
        "static-files"
    }

    async fn on_request(&self, req: &mut EdgeRequest) -> Result<Outcome, EdgeError> {
        let is_head = match *req.method() {
            Method::GET => false,
            Method::HEAD => true,
            _ => return Ok(Outcome::Continue),
        };
        let Some(root) = &self.root else {
            return Ok(Outcome::Continue);
        };

        let Some(path) = self.resolve(root, req.uri().path())? else {
            return Ok(Outcome::Continue);
        };
        let Some(file) = self.canonical_file(root, &path).await? else {
            return Ok(Outcome::Continue);
        };

        let (metadata, content) = match tokio::try_join!(tokio::fs::metadata(&file), tokio::fs::read(&file)) {
            Ok(found) => found,
            Err(e) => {
                debug!(file = %file.display(), cause = %e, "static file unreadable, fall through");
                return Ok(Outcome::Continue);
            }
        };
        debug!(file = %file.display(), size = content.len(), "serve static file");

        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime_type(&file)));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if let Ok(last_modified) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
            headers.insert(LAST_MODIFIED, last_modified);
        }

        if is_head {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(content.len()));
        } else {
            *response.body_mut() = ResponseBody::from(content);
        }
        Ok(Outcome::Handled(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    fn assets() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("index.html"), "<h1>docs</h1>").unwrap();
        std::fs::write(dir.path().join("docs").join("app v1.css"), "body{}").unwrap();
        dir
    }

    fn stage(dir: &TempDir) -> StaticFiles {
        StaticFiles::new(&PipelineConfig::default().with_asset_root(dir.path()))
    }

    async fn serve(stage: &StaticFiles, method: Method, uri: &str) -> Result<Outcome, EdgeError> {
        let mut req: EdgeRequest = Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap().into();
        stage.on_request(&mut req).await
    }

    async fn body_of(outcome: Outcome) -> (Response<()>, Bytes) {
        let Outcome::Handled(response) = outcome else {
            panic!("expected a static response");
        };
        let (parts, body) = response.into_parts();
        (Response::from_parts(parts, ()), body.collect().await.unwrap().to_bytes())
    }

    #[tokio::test]
    async fn test_serve_file() {
        let dir = assets();
        let (head, body) = body_of(serve(&stage(&dir), Method::GET, "/docs/app%20v1.css").await.unwrap()).await;

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.headers().get(CONTENT_TYPE).unwrap(), "text/css; charset=utf-8");
        assert_eq!(head.headers().get(CACHE_CONTROL).unwrap(), "max-age=0");
        assert!(head.headers().contains_key(LAST_MODIFIED));
        assert_eq!(body, Bytes::from_static(b"body{}"));
    }

    #[tokio::test]
    async fn test_index_file() {
        let dir = assets();
        let stage = stage(&dir);

        let (_, body) = body_of(serve(&stage, Method::GET, "/").await.unwrap()).await;
        assert_eq!(body, Bytes::from_static(b"<h1>home</h1>"));

        let (_, body) = body_of(serve(&stage, Method::GET, "/docs").await.unwrap()).await;
        assert_eq!(body, Bytes::from_static(b"<h1>docs</h1>"));
    }

    #[tokio::test]
    async fn test_head_has_empty_body() {
        let dir = assets();
        let (head, body) = body_of(serve(&stage(&dir), Method::HEAD, "/index.html").await.unwrap()).await;

        assert_eq!(head.headers().get(CONTENT_LENGTH).unwrap(), "13");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_fall_through() {
        let dir = assets();
        let stage = stage(&dir);

        assert!(matches!(serve(&stage, Method::GET, "/missing.js").await, Ok(Outcome::Continue)));
        assert!(matches!(serve(&stage, Method::POST, "/index.html").await, Ok(Outcome::Continue)));
        assert!(matches!(serve(&stage, Method::GET, "/.env").await, Ok(Outcome::Continue)));
    }

    #[tokio::test]
    async fn test_traversal_is_forbidden() {
        let dir = assets();
        let stage = stage(&dir);

        assert!(matches!(serve(&stage, Method::GET, "/../etc/passwd").await, Err(EdgeError::Forbidden)));
        assert!(matches!(serve(&stage, Method::GET, "/docs/%2e%2e/%2e%2e/secret").await, Err(EdgeError::Forbidden)));
    }

    #[tokio::test]
    async fn test_dot_segments_inside_root_are_normalized() {
        let dir = assets();
        let stage = stage(&dir);

        let (head, body) = body_of(serve(&stage, Method::GET, "/docs/../index.html").await.unwrap()).await;
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"<h1>home</h1>"));

        let (_, body) = body_of(serve(&stage, Method::GET, "/docs/./../docs/index.html").await.unwrap()).await;
        assert_eq!(body, Bytes::from_static(b"<h1>docs</h1>"));

        assert!(matches!(serve(&stage, Method::GET, "/docs/../../x").await, Err(EdgeError::Forbidden)));
        assert!(matches!(serve(&stage, Method::GET, "/docs/../.env").await, Ok(Outcome::Continue)));
    }

    #[tokio::test]
    async fn test_invalid_path_encoding() {
        let dir = assets();
        let stage = stage(&dir);

        assert!(matches!(serve(&stage, Method::GET, "/%ff.txt").await, Err(EdgeError::BadRequest { .. })));
        assert!(matches!(serve(&stage, Method::GET, "/a%00.txt").await, Err(EdgeError::BadRequest { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_is_forbidden() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let dir = assets();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt")).unwrap();

        assert!(matches!(serve(&stage(&dir), Method::GET, "/link.txt").await, Err(EdgeError::Forbidden)));
    }

    #[tokio::test]
    async fn test_missing_root_disables_stage() {
        let stage = StaticFiles::new(&PipelineConfig::default().with_asset_root("/definitely/not/here"));
        assert!(matches!(serve(&stage, Method::GET, "/index.html").await, Ok(Outcome::Continue)));
    }
}
