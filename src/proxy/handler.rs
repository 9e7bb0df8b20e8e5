use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::http::request::{self, Disposition};
use crate::http::response::{self, ProxyBody};
use crate::proxy::ProxyContext;

/// Entry point for every request hyper reads off a client connection.
pub async fn handle_request(
    ctx: Arc<ProxyContext>,
    req: Request<Incoming>,
    peer: SocketAddr,
) -> Result<Response<ProxyBody>, Infallible> {
    let response = match Disposition::classify(&req, &ctx.config) {
        Disposition::Preflight => {
            debug!(
                peer = %peer,
                path = %req.uri().path(),
                "Answered preflight"
            );
            response::preflight(&ctx.cors)
        }
        Disposition::Forward => forward(&ctx, req, peer).await,
    };
    Ok(response)
}

async fn forward(
    ctx: &ProxyContext,
    req: Request<Incoming>,
    peer: SocketAddr,
) -> Response<ProxyBody> {
    let method = req.method().clone();
    let path = request::path_and_query(req.uri());

    let inbound = req.map(|body| body.boxed());
    let outbound = match request::outbound_request(inbound, &ctx.config.target) {
        Ok(outbound) => outbound,
        Err(e) => {
            warn!(
                peer = %peer,
                method = %method,
                path = %path,
                error = %e,
                "Could not build upstream request"
            );
            return decorate(ctx, response::plain(StatusCode::BAD_REQUEST, "400 Bad Request\n"));
        }
    };

    match ctx.upstream.send(outbound).await {
        Ok(upstream) => {
            info!(
                peer = %peer,
                method = %method,
                path = %path,
                status = upstream.status().as_u16(),
                "Request forwarded"
            );

            let upstream = upstream.map(|body| {
                body.map_err(move |e| {
                    warn!(
                        method = %method,
                        path = %path,
                        error = %e,
                        "Upstream response body failed mid-stream"
                    );
                    e
                })
                .boxed()
            });
            decorate(ctx, upstream)
        }
        Err(e) => {
            warn!(
                peer = %peer,
                method = %method,
                path = %path,
                upstream = %ctx.config.target.url,
                error = %e,
                "Upstream request failed"
            );
            decorate(ctx, response::gateway_error(&e))
        }
    }
}

fn decorate(ctx: &ProxyContext, response: Response<ProxyBody>) -> Response<ProxyBody> {
    if ctx.config.cors_enabled {
        response::with_cors(response, &ctx.cors, ctx.config.allow_credentials)
    } else {
        response
    }
}
