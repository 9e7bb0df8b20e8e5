use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::debug;

use crate::proxy::{ProxyContext, handle_request};

/// One accepted client connection, plaintext or TLS.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    ctx: Arc<ProxyContext>,
    shutdown: watch::Receiver<bool>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        ctx: Arc<ProxyContext>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream,
            peer,
            ctx,
            shutdown,
        }
    }

    /// Serve requests until the client hangs up.
    ///
    /// When the listener closes, the exchange in progress finishes and the
    /// connection is then shut down instead of waiting for the next request.
    pub async fn run(mut self) -> Result<(), hyper::Error> {
        let peer = self.peer;
        let ctx = self.ctx;
        let service = service_fn(move |req| handle_request(Arc::clone(&ctx), req, peer));

        let conn = http1::Builder::new().serve_connection(TokioIo::new(self.stream), service);
        tokio::pin!(conn);

        tokio::select! {
            res = conn.as_mut() => res,
            _ = self.shutdown.changed() => {
                debug!(peer = %peer, "Draining connection");
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }
}
