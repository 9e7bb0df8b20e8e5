use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::cors::CorsHeaderSet;
use crate::proxy::upstream::UpstreamClient;

/// Read-only state shared by every exchange of one proxy.
#[derive(Debug)]
pub struct ProxyContext {
    pub config: ProxyConfig,
    pub cors: CorsHeaderSet,
    pub upstream: UpstreamClient,
}

impl ProxyContext {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let cors = CorsHeaderSet::compute(&config);
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self {
            config,
            cors,
            upstream,
        })
    }
}
