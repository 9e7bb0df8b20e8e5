//! CORS response headers
//!
//! The header block is derived once from a [`ProxyConfig`] and served as is
//! on every preflight and forwarded response.

use hyper::HeaderMap;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, HeaderName, HeaderValue,
};

use crate::config::ProxyConfig;

/// The five headers, in the order they are emitted.
pub const CORS_HEADER_NAMES: [HeaderName; 5] = [
    ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_METHOD,
    ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_CREDENTIALS,
];

static ANY: HeaderValue = HeaderValue::from_static("*");
static TRUE: HeaderValue = HeaderValue::from_static("true");

/// Frozen set of CORS response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsHeaderSet {
    headers: HeaderMap,
}

impl CorsHeaderSet {
    /// Compute the header set for `config`.
    ///
    /// Only `Access-Control-Allow-Headers` and `Access-Control-Allow-Methods`
    /// take their value from the config; the rest use their defaults.
    pub fn compute(config: &ProxyConfig) -> Self {
        let mut headers = HeaderMap::with_capacity(CORS_HEADER_NAMES.len());

        for name in CORS_HEADER_NAMES {
            let value = if name == ACCESS_CONTROL_ALLOW_HEADERS {
                config.allow_headers.clone()
            } else if name == ACCESS_CONTROL_ALLOW_METHODS {
                config.allow_methods.clone()
            } else {
                default_for(&name)
            };
            headers.insert(name, value);
        }

        Self { headers }
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Insert every header into `target`, replacing existing values.
    pub fn apply_to(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }

    /// Insert only the headers `target` does not already carry.
    pub fn fill_missing(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
    }
}

fn default_for(name: &HeaderName) -> HeaderValue {
    if name == ACCESS_CONTROL_ALLOW_CREDENTIALS {
        TRUE.clone()
    } else {
        ANY.clone()
    }
}

/// Headers forced onto every forwarded upstream response.
pub(crate) fn force_origin(target: &mut HeaderMap, allow_credentials: bool) {
    target.insert(ACCESS_CONTROL_ALLOW_ORIGIN, ANY.clone());
    if allow_credentials {
        target.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, TRUE.clone());
    }
}
