//! Listening socket and accept loop.

pub mod listener;
pub mod tls;

pub use listener::Proxy;
pub use tls::Transport;
