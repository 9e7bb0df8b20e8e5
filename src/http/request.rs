//! Inbound to outbound request translation.

use hyper::header::HOST;
use hyper::http::uri::PathAndQuery;
use hyper::{Method, Request, Uri};

use crate::config::{ProxyConfig, Target};

/// What the proxy does with an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Answer with the CORS header block; the upstream is never contacted.
    Preflight,
    /// Stream the request to the upstream.
    Forward,
}

impl Disposition {
    pub fn classify<B>(req: &Request<B>, config: &ProxyConfig) -> Self {
        if config.cors_enabled && is_options(req.method()) {
            Disposition::Preflight
        } else {
            Disposition::Forward
        }
    }
}

/// `OPTIONS`, compared case-insensitively since hyper keeps extension
/// methods such as `options` as sent.
pub fn is_options(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case(Method::OPTIONS.as_str())
}

/// Path and query of an inbound URI, `/` when absent.
pub fn path_and_query(uri: &Uri) -> PathAndQuery {
    uri.path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"))
}

/// Rewrite `req` so it targets the upstream.
///
/// The method, path, query, headers and body are kept; scheme and authority
/// come from the target and `Host` becomes the target's hostname.
pub fn outbound_request<B>(
    req: Request<B>,
    target: &Target,
) -> Result<Request<B>, hyper::http::Error> {
    let (mut parts, body) = req.into_parts();

    parts.uri = Uri::builder()
        .scheme(target.protocol.scheme())
        .authority(target.authority().clone())
        .path_and_query(path_and_query(&parts.uri))
        .build()?;

    parts.headers.insert(HOST, target.host_header().clone());

    Ok(Request::from_parts(parts, body))
}
