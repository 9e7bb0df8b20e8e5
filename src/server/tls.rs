//! Listener transports.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tokio_rustls::TlsAcceptor;

use crate::config::{Protocol, ProxyConfig};
use crate::error::ProxyError;

/// How accepted sockets are turned into HTTP streams.
#[derive(Clone)]
pub enum Transport {
    Plaintext,
    Tls(TlsAcceptor),
}

impl Transport {
    /// Pick the transport for the configured listen protocol, loading the
    /// certificate and key for `https`.
    pub fn for_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        match config.listen_protocol {
            Protocol::Http => Ok(Transport::Plaintext),
            Protocol::Https => {
                let tls = config
                    .tls
                    .as_ref()
                    .ok_or_else(|| ProxyError::Tls("no certificate configured".to_string()))?;
                Ok(Transport::Tls(create_tls_acceptor(&tls.cert_path, &tls.key_path)?))
            }
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Transport::Plaintext => Protocol::Http,
            Transport::Tls(_) => Protocol::Https,
        }
    }
}

/// Create a TLS acceptor from PEM certificate chain and key files.
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ProxyError> {
    let cert_file = File::open(cert_path).map_err(|e| {
        ProxyError::Tls(format!("failed to open certificate file {}: {e}", cert_path.display()))
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| ProxyError::Tls(format!("failed to parse certificate file: {e}")))?;

    if certs.is_empty() {
        return Err(ProxyError::Tls(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key_file = File::open(key_path).map_err(|e| {
        ProxyError::Tls(format!("failed to open private key file {}: {e}", key_path.display()))
    })?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| ProxyError::Tls(format!("failed to parse private key file: {e}")))?
        .ok_or_else(|| {
            ProxyError::Tls(format!("no private key found in {}", key_path.display()))
        })?;

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
