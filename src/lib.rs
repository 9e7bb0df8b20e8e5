//! corsgate - CORS-injecting reverse proxy
//!
//! Forwards every request to one fixed upstream, answers CORS preflights
//! itself and adds CORS headers to upstream responses. Bodies are streamed
//! in both directions.

pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod server;

pub use config::{Config, DEFAULT_PORT, Protocol, ProxyConfig, ProxyOptions};
pub use error::{ConfigError, ProxyError, UpstreamError};
pub use http::cors::CorsHeaderSet;
pub use server::Proxy;
