//! Process wide configuration.
//!
//! [`PipelineConfig`] is built once at startup and shared read-only as an
//! `Arc` by every stage. [`EdgeConfig::from_env`] reads the `EDGE_*`
//! environment variables; [`EdgeConfig::from_lookup`] does the same from any
//! lookup function so tests never touch the process environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use http::Method;
use thiserror::Error;
use tracing::Level;

/// Selects whether optional production-only stages are part of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    Production,
    #[default]
    Development,
}

impl RuntimeMode {
    /// Only the exact value `production` selects [`RuntimeMode::Production`].
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("production") => RuntimeMode::Production,
            _ => RuntimeMode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeMode::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Cross-origin policy applied to every response.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub origins: AllowedOrigins,
    pub allow_methods: Vec<Method>,
    /// `None` echoes `Access-Control-Request-Headers` on preflight
    pub allow_headers: Option<Vec<String>>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<u64>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            allow_methods: vec![Method::GET, Method::HEAD, Method::PUT, Method::POST, Method::DELETE, Method::PATCH],
            allow_headers: None,
            expose_headers: vec![],
            allow_credentials: false,
            max_age: None,
        }
    }
}

/// Largest body accepted per decoded kind, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    pub json: usize,
    pub form: usize,
    pub text: usize,
    pub multipart: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self { json: 1024 * 1024, form: 56 * 1024, text: 56 * 1024, multipart: 200 * 1024 * 1024 }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub asset_root: PathBuf,
    pub index_file: String,
    pub cors: CorsPolicy,
    pub pretty_param: String,
    pub pretty_spaces: usize,
    pub runtime_mode: RuntimeMode,
    pub body_limits: BodyLimits,
    /// Accept only objects and arrays as JSON bodies
    pub json_strict: bool,
    /// Bodies smaller than this many bytes are sent uncompressed
    pub compression_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("public"),
            index_file: "index.html".into(),
            cors: CorsPolicy::default(),
            pretty_param: "pretty".into(),
            pretty_spaces: 2,
            runtime_mode: RuntimeMode::Development,
            body_limits: BodyLimits::default(),
            json_strict: true,
            compression_threshold: 0,
        }
    }
}

impl PipelineConfig {
    pub fn with_asset_root(mut self, asset_root: impl Into<PathBuf>) -> Self {
        self.asset_root = asset_root.into();
        self
    }

    pub fn with_runtime_mode(mut self, runtime_mode: RuntimeMode) -> Self {
        self.runtime_mode = runtime_mode;
        self
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_pretty_param(mut self, pretty_param: impl Into<String>) -> Self {
        self.pretty_param = pretty_param.into();
        self
    }

    pub fn with_body_limits(mut self, body_limits: BodyLimits) -> Self {
        self.body_limits = body_limits;
        self
    }

    pub fn with_compression_threshold(mut self, compression_threshold: usize) -> Self {
        self.compression_threshold = compression_threshold;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 3000, log_level: Level::INFO }
    }
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgeConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str) -> Self {
        Self::InvalidValue { name, value: value.to_string() }
    }
}

impl EdgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EdgeConfig::default();

        config.pipeline.runtime_mode = RuntimeMode::from_env_value(lookup("EDGE_ENV").as_deref());

        if let Some(host) = lookup("EDGE_HOST") {
            config.server.host = parse("EDGE_HOST", &host)?;
        }
        if let Some(port) = lookup("EDGE_PORT") {
            config.server.port = parse("EDGE_PORT", &port)?;
        }
        if let Some(level) = lookup("EDGE_LOG_LEVEL") {
            config.server.log_level = parse("EDGE_LOG_LEVEL", &level)?;
        }
        if let Some(asset_root) = lookup("EDGE_ASSET_ROOT") {
            config.pipeline.asset_root = PathBuf::from(asset_root);
        }
        if let Some(pretty_param) = lookup("EDGE_PRETTY_PARAM") {
            if pretty_param.is_empty() {
                return Err(ConfigError::invalid("EDGE_PRETTY_PARAM", &pretty_param));
            }
            config.pipeline.pretty_param = pretty_param;
        }
        if let Some(threshold) = lookup("EDGE_COMPRESSION_THRESHOLD") {
            config.pipeline.compression_threshold = parse("EDGE_COMPRESSION_THRESHOLD", &threshold)?;
        }
        if let Some(origins) = lookup("EDGE_CORS_ORIGINS") {
            config.pipeline.cors.origins = parse_origins(&origins);
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::invalid(name, value))
}

fn parse_origins(value: &str) -> AllowedOrigins {
    if value.trim() == "*" {
        return AllowedOrigins::Any;
    }
    let origins = value.split(',').map(str::trim).filter(|origin| !origin.is_empty()).map(String::from).collect();
    AllowedOrigins::List(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EdgeConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_level, Level::INFO);
        assert_eq!(config.pipeline.asset_root, PathBuf::from("public"));
        assert_eq!(config.pipeline.pretty_param, "pretty");
        assert_eq!(config.pipeline.runtime_mode, RuntimeMode::Development);
        assert_eq!(config.pipeline.cors.origins, AllowedOrigins::Any);
    }

    #[test]
    fn test_only_exact_production_enables_production() {
        assert_eq!(RuntimeMode::from_env_value(Some("production")), RuntimeMode::Production);
        assert_eq!(RuntimeMode::from_env_value(Some("Production")), RuntimeMode::Development);
        assert_eq!(RuntimeMode::from_env_value(Some("prod")), RuntimeMode::Development);
        assert_eq!(RuntimeMode::from_env_value(None), RuntimeMode::Development);
    }

    #[test]
    fn test_overrides() {
        let config = EdgeConfig::from_lookup(lookup(&[
            ("EDGE_ENV", "production"),
            ("EDGE_HOST", "127.0.0.1"),
            ("EDGE_PORT", "8080"),
            ("EDGE_ASSET_ROOT", "/srv/www"),
            ("EDGE_PRETTY_PARAM", "indent"),
            ("EDGE_CORS_ORIGINS", "https://a.example, https://b.example"),
            ("EDGE_COMPRESSION_THRESHOLD", "1024"),
            ("EDGE_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert!(config.pipeline.runtime_mode.is_production());
        assert_eq!(config.server.address().to_string(), "127.0.0.1:8080");
        assert_eq!(config.server.log_level, Level::DEBUG);
        assert_eq!(config.pipeline.asset_root, PathBuf::from("/srv/www"));
        assert_eq!(config.pipeline.pretty_param, "indent");
        assert_eq!(config.pipeline.compression_threshold, 1024);
        assert_eq!(
            config.pipeline.cors.origins,
            AllowedOrigins::List(vec!["https://a.example".into(), "https://b.example".into()])
        );
    }

    #[test]
    fn test_invalid_port() {
        let result = EdgeConfig::from_lookup(lookup(&[("EDGE_PORT", "http")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { name: "EDGE_PORT", .. })));
    }
}
