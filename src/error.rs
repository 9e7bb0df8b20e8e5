//! Error types
//!
//! Construction and listen-time failures are loud and returned to the
//! caller. Upstream failures are per-exchange and are turned into gateway
//! responses by the forwarding engine.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration could not be resolved. Fatal to construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid target URL '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported target scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("target URL '{0}' has no host")]
    MissingHost(String),

    #[error("https listener requires a TLS certificate and private key")]
    MissingTlsFiles,

    #[error("invalid value for {name}: {value:?}")]
    InvalidHeaderValue { name: &'static str, value: String },

    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Failure talking to the upstream target, scoped to a single exchange.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to connect to upstream: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    #[error("upstream request failed: {0}")]
    Request(#[source] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }
}

/// Errors surfaced by the proxy's public operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy is already listening on {0}")]
    AlreadyListening(SocketAddr),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}
