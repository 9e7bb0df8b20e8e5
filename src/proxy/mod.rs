//! Forwarding to the upstream target
//!
//! This module holds the per-proxy shared state, the upstream client and
//! the request handler that decides between answering a preflight and
//! forwarding.

pub mod context;
pub mod handler;
pub mod upstream;

pub use context::ProxyContext;
pub use handler::handle_request;
pub use upstream::UpstreamClient;
