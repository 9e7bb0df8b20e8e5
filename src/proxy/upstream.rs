//! Upstream connection and request forwarding
//!
//! Requests are sent with hyper's pooled client. The connector speaks TLS
//! only when the target is `https`; the choice is made once, when the
//! client is built.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

use crate::config::{ProxyConfig, Protocol};
use crate::error::{ProxyError, UpstreamError};
use crate::http::response::ProxyBody;

type Connector = HttpsConnector<HttpConnector>;

/// Client for the single upstream target.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<Connector, ProxyBody>,
    protocol: Protocol,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        if !config.connect_timeout.is_zero() {
            http.set_connect_timeout(Some(config.connect_timeout));
        }

        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(Arc::new(rustls::crypto::ring::default_provider()))?;
        let connector = match config.target.protocol {
            Protocol::Https => builder.https_only().enable_http1().wrap_connector(http),
            Protocol::Http => builder.https_or_http().enable_http1().wrap_connector(http),
        };

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            protocol: config.target.protocol,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        })
    }

    /// Send `req` and wait for the response head.
    ///
    /// The response body is not read here; it streams to the client as it
    /// arrives. A zero read timeout waits indefinitely.
    pub async fn send(&self, req: Request<ProxyBody>) -> Result<Response<Incoming>, UpstreamError> {
        let pending = self.client.request(req);

        let result = if self.read_timeout.is_zero() {
            pending.await
        } else {
            timeout(self.read_timeout, pending)
                .await
                .map_err(|_| UpstreamError::Timeout(self.read_timeout))?
        };

        result.map_err(|e| {
            if e.is_connect() {
                UpstreamError::Connect(e)
            } else {
                UpstreamError::Request(e)
            }
        })
    }
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("protocol", &self.protocol)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}
