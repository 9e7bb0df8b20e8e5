use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ProxyConfig, ProxyOptions};
use crate::error::ProxyError;
use crate::http::connection::Connection;
use crate::http::cors::CorsHeaderSet;
use crate::proxy::ProxyContext;
use crate::server::tls::Transport;

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not
/// spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A CORS-injecting reverse proxy for a single upstream.
///
/// ```ignore
/// let mut proxy = Proxy::new(ProxyOptions::new("http://api.example.com"))?;
/// proxy.listen(3000).await?;
/// // ...
/// proxy.close().await;
/// ```
pub struct Proxy {
    ctx: Arc<ProxyContext>,
    socket: Option<ListeningSocket>,
}

struct ListeningSocket {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_loop: JoinHandle<()>,
}

impl Proxy {
    /// Resolve `options` and build the proxy. Nothing is bound yet.
    pub fn new(options: ProxyOptions) -> Result<Self, ProxyError> {
        Self::from_config(ProxyConfig::resolve(options)?)
    }

    pub fn from_config(config: ProxyConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            ctx: Arc::new(ProxyContext::new(config)?),
            socket: None,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.ctx.config
    }

    pub fn cors_headers(&self) -> &CorsHeaderSet {
        &self.ctx.cors
    }

    /// Address of the active listening socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().map(|s| s.local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.socket.is_some()
    }

    /// Bind `port` (0 for an ephemeral port) and start accepting.
    ///
    /// Returns once the socket is bound. Fails with
    /// [`ProxyError::AlreadyListening`] if a socket is already active.
    pub async fn listen(&mut self, port: u16) -> Result<&mut Self, ProxyError> {
        self.listen_with(port, || {}).await
    }

    /// Like [`Proxy::listen`], calling `on_ready` once the socket is bound.
    pub async fn listen_with<F>(&mut self, port: u16, on_ready: F) -> Result<&mut Self, ProxyError>
    where
        F: FnOnce(),
    {
        if let Some(socket) = &self.socket {
            return Err(ProxyError::AlreadyListening(socket.local_addr));
        }

        let transport = Transport::for_config(&self.ctx.config)?;
        let addr = SocketAddr::new(self.ctx.config.bind_address, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Listen { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ProxyError::Listen { addr, source })?;

        info!(
            "Listening on {}://{}, forwarding to {}",
            transport.protocol(),
            local_addr,
            self.ctx.config.target.url
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_loop = tokio::spawn(run(
            listener,
            transport,
            Arc::clone(&self.ctx),
            shutdown_rx,
        ));

        self.socket = Some(ListeningSocket {
            local_addr,
            shutdown,
            accept_loop,
        });

        on_ready();
        Ok(self)
    }

    /// Stop accepting and release the socket.
    ///
    /// Returns once the socket is closed. Connections already accepted
    /// finish their current exchange and are then shut down; they are not
    /// awaited here.
    pub async fn close(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };

        let _ = socket.shutdown.send(true);
        if let Err(e) = socket.accept_loop.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }
        info!("Stopped listening on {}", socket.local_addr);
    }
}

async fn run(
    listener: TcpListener,
    transport: Transport,
    ctx: Arc<ProxyContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (socket, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    if backoff(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            },
        };
        debug!("Accepted connection from {}", peer);

        let ctx = Arc::clone(&ctx);
        let transport = transport.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = match transport {
                Transport::Plaintext => Connection::new(socket, peer, ctx, shutdown).run().await,
                Transport::Tls(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => Connection::new(stream, peer, ctx, shutdown).run().await,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                },
            };

            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "Connection error");
            }
        });
    }
}

/// Sleep for [`ACCEPT_BACKOFF`]. Returns `true` if shutdown was signalled
/// meanwhile.
async fn backoff(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => false,
    }
}
