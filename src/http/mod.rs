//! HTTP side of the proxy.
//!
//! Wire parsing and serialization are handled by hyper; this module decides
//! what goes on the wire.
//!
//! - **`connection`**: serves one accepted connection and drains it on close
//! - **`request`**: preflight classification and outbound request rewriting
//! - **`response`**: preflight, gateway-error and CORS-merged responses
//! - **`cors`**: the frozen CORS header block
//!
//! # Exchange State Machine
//!
//! Every request on a connection goes through:
//!
//! ```text
//!        ┌─────────────┐
//!        │  Accepted   │ ← Request head received
//!        └──────┬──────┘
//!               │ classify (CORS on + OPTIONS?)
//!        ┌──────┴───────────────┐
//!        ▼                      ▼
//!  ┌───────────┐         ┌──────────────┐
//!  │ Preflight │         │  Forwarding  │ ← Stream body to upstream
//!  └─────┬─────┘         └──────┬───────┘
//!        │ 200 + CORS           ├─ Upstream head → relay status, headers, body
//!        ▼                      └─ Upstream failure → 502 / 504
//!   Completed               Completed / Aborted
//! ```
//!
//! Each branch writes exactly one status line and one header block.

pub mod connection;
pub mod cors;
pub mod request;
pub mod response;
