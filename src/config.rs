//! Proxy configuration
//!
//! [`ProxyOptions`] is what a caller hands to the proxy (from code, a YAML
//! file or the environment). [`ProxyConfig::resolve`] turns it into the
//! immutable configuration every connection reads from.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hyper::header::HeaderValue;
use hyper::http::uri::{Authority, Scheme};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_TARGET: &str = "http://127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const WILDCARD: &str = "*";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Transport used by the listener or the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Protocol::Http => Scheme::HTTP,
            Protocol::Https => Scheme::HTTPS,
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("http") {
            Ok(Protocol::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Ok(Protocol::Https)
        } else {
            Err(())
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PEM files for an https listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsFiles {
    #[serde(alias = "certPath")]
    pub cert_path: PathBuf,
    #[serde(alias = "keyPath")]
    pub key_path: PathBuf,
}

/// Caller-facing options. Every field has a default, so an empty YAML
/// document is a valid configuration. Keys are accepted in snake_case or
/// camelCase (`allow_headers` / `allowHeaders`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Upstream URL every request is forwarded to.
    pub target: String,
    /// Transport the proxy itself listens on.
    pub protocol: Protocol,
    /// Answer preflights and add CORS headers.
    pub cors: bool,
    #[serde(alias = "allowHeaders")]
    pub allow_headers: Option<String>,
    #[serde(alias = "allowMethods")]
    pub allow_methods: Option<String>,
    #[serde(alias = "allowCredentials")]
    pub allow_credentials: bool,
    pub tls: Option<TlsFiles>,
    #[serde(alias = "bindAddress")]
    pub bind_address: IpAddr,
    #[serde(alias = "connectTimeoutSecs")]
    pub connect_timeout_secs: u64,
    #[serde(alias = "readTimeoutSecs")]
    pub read_timeout_secs: u64,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            protocol: Protocol::Http,
            cors: true,
            allow_headers: None,
            allow_methods: None,
            allow_credentials: false,
            tls: None,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

impl ProxyOptions {
    /// Options with defaults, forwarding to `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = Some(headers.into());
        self
    }

    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = Some(methods.into());
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsFiles {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }
}

/// The upstream, broken into the pieces outbound requests are built from.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: Url,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    authority: Authority,
    host_header: HeaderValue,
}

impl Target {
    fn parse(target: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(target).map_err(|source| ConfigError::InvalidTarget {
            target: target.to_string(),
            source,
        })?;

        let protocol = url
            .scheme()
            .parse::<Protocol>()
            .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::MissingHost(target.to_string()))?
            .to_string();

        let port = url.port_or_known_default().unwrap_or(match protocol {
            Protocol::Http => 80,
            Protocol::Https => 443,
        });

        let invalid_host = || ConfigError::InvalidHeaderValue {
            name: "Host",
            value: host.clone(),
        };
        let authority = format!("{host}:{port}")
            .parse::<Authority>()
            .map_err(|_| invalid_host())?;
        let host_header = HeaderValue::from_str(&host).map_err(|_| invalid_host())?;

        Ok(Self {
            url,
            protocol,
            host,
            port,
            authority,
            host_header,
        })
    }

    /// `host:port` used in outbound request URIs.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Value the outbound `Host` header is rewritten to.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }
}

/// Immutable configuration shared by every connection of a proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub target: Target,
    pub listen_protocol: Protocol,
    pub cors_enabled: bool,
    /// Validated `Access-Control-Allow-Headers` value.
    pub allow_headers: HeaderValue,
    /// Validated `Access-Control-Allow-Methods` value.
    pub allow_methods: HeaderValue,
    pub allow_credentials: bool,
    pub tls: Option<TlsFiles>,
    pub bind_address: IpAddr,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl ProxyConfig {
    /// Resolve caller options into a configuration.
    ///
    /// Performs no I/O. When credentials are allowed with an explicit
    /// wildcard header list a warning is logged and the list is kept as is.
    pub fn resolve(options: ProxyOptions) -> Result<Self, ConfigError> {
        let target = Target::parse(&options.target)?;

        if options.protocol == Protocol::Https && options.tls.is_none() {
            return Err(ConfigError::MissingTlsFiles);
        }

        let allow_headers = header_value(
            "allowHeaders",
            resolve_allow_headers(options.allow_headers.as_deref(), options.allow_credentials),
        )?;
        let allow_methods = header_value(
            "allowMethods",
            options
                .allow_methods
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| WILDCARD.to_string()),
        )?;

        Ok(Self {
            target,
            listen_protocol: options.protocol,
            cors_enabled: options.cors,
            allow_headers,
            allow_methods,
            allow_credentials: options.allow_credentials,
            tls: options.tls,
            bind_address: options.bind_address,
            connect_timeout: Duration::from_secs(options.connect_timeout_secs),
            read_timeout: Duration::from_secs(options.read_timeout_secs),
        })
    }
}

/// Credentialed CORS requests cannot use a wildcard header list, and the
/// browser must be allowed to send `Authorization`.
fn resolve_allow_headers(allow_headers: Option<&str>, allow_credentials: bool) -> String {
    let given = allow_headers.filter(|h| !h.is_empty());

    if !allow_credentials {
        return given.unwrap_or(WILDCARD).to_string();
    }

    match given {
        Some(headers) if headers.to_ascii_lowercase().contains("authorization") => {
            headers.to_string()
        }
        Some(WILDCARD) => {
            warn!(
                "Access-Control-Allow-Headers: * is not honoured by browsers when \
                 Access-Control-Allow-Credentials: true is set; list the headers explicitly"
            );
            WILDCARD.to_string()
        }
        Some(headers) => format!("{}, Authorization", headers.trim_end_matches([',', ' '])),
        None => " Authorization".to_string(),
    }
}

fn header_value(name: &'static str, value: String) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeaderValue { name, value })
}

/// Launcher configuration: proxy options plus the port to listen on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(flatten)]
    pub proxy: ProxyOptions,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            proxy: ProxyOptions::default(),
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = ProxyOptions::default();

        let tls = match (env_var("PROXY_TLS_CERT"), env_var("PROXY_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            _ => None,
        };

        let proxy = ProxyOptions {
            target: env_var("PROXY_TARGET").unwrap_or(defaults.target),
            protocol: env_parse("PROXY_PROTOCOL")?.unwrap_or(defaults.protocol),
            cors: env_bool("PROXY_CORS")?.unwrap_or(defaults.cors),
            allow_headers: env_var("PROXY_ALLOW_HEADERS"),
            allow_methods: env_var("PROXY_ALLOW_METHODS"),
            allow_credentials: env_bool("PROXY_ALLOW_CREDENTIALS")?
                .unwrap_or(defaults.allow_credentials),
            tls,
            bind_address: env_parse("PROXY_BIND")?.unwrap_or(defaults.bind_address),
            connect_timeout_secs: env_parse("PROXY_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(defaults.connect_timeout_secs),
            read_timeout_secs: env_parse("PROXY_READ_TIMEOUT_SECS")?
                .unwrap_or(defaults.read_timeout_secs),
        };

        Ok(Self {
            port: env_parse("LISTEN_PORT")?.unwrap_or(DEFAULT_PORT),
            proxy,
        })
    }

    /// Load from a YAML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    env_var(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name, value })
        })
        .transpose()
}

fn env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    env_var(name)
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidEnv { name, value }),
        })
        .transpose()
}
