//! Responses written back to the client.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use std::convert::Infallible;

use crate::error::UpstreamError;
use crate::http::cors::{self, CorsHeaderSet};

/// Body type of every response the proxy produces.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed()
}

pub fn full(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into())
        .map_err(|never: Infallible| match never {})
        .boxed()
}

/// Answer to a CORS preflight: 200, the CORS header block, no body.
pub fn preflight(cors: &CorsHeaderSet) -> Response<ProxyBody> {
    let mut response = Response::new(empty());
    cors.apply_to(response.headers_mut());
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

/// Plain-text response with the given status.
pub fn plain(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(message.len()));
    response
}

/// 504 when the upstream timed out, 502 for everything else.
pub fn gateway_error(error: &UpstreamError) -> Response<ProxyBody> {
    if error.is_timeout() {
        plain(
            StatusCode::GATEWAY_TIMEOUT,
            "504 Gateway Timeout\n\nThe upstream server did not respond in time.\n",
        )
    } else {
        plain(
            StatusCode::BAD_GATEWAY,
            "502 Bad Gateway\n\nFailed to reach the upstream server.\n",
        )
    }
}

/// Layer CORS headers onto a response headed back to the client.
///
/// Headers the response already has win over the CORS block, except
/// `Access-Control-Allow-Origin` (always `*`) and, when credentials are
/// allowed, `Access-Control-Allow-Credentials`.
pub fn with_cors<B>(
    mut response: Response<B>,
    cors: &CorsHeaderSet,
    allow_credentials: bool,
) -> Response<B> {
    let headers = response.headers_mut();
    cors.fill_missing(headers);
    cors::force_origin(headers, allow_credentials);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN};

    #[test]
    fn plain_sets_length_and_type() {
        let response = plain(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "4");
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn with_cors_overrides_upstream_origin() {
        let config = crate::config::ProxyConfig::resolve(Default::default()).unwrap();
        let cors = CorsHeaderSet::compute(&config);
        let upstream = Response::builder()
            .status(StatusCode::CREATED)
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "https://only.example.com")
            .body(())
            .unwrap();

        let response = with_cors(upstream, &cors, false);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        // Default block still carries the credentials header.
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }
}
