// SPDX-License-Identifier: Apache-2.0
//! Bearer-token auth middleware with per-IP rate limiting; unlike a single
//! shared operator token, this resolves a `user_id` per request, which
//! downstream handlers attach to every command and check against a
//! session's recorded owner. Failed attempts are rate-limited with the
//! `governor` GCRA limiter; loopback addresses are exempt since a local
//! process already has local access to the machine.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use tracing::warn;

use crate::token::TokenRegistry;

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Shared auth state threaded through the Axum router via `State`.
#[derive(Clone)]
pub struct AuthState {
    registry: Arc<TokenRegistry>,
    limiter: Arc<IpLimiter>,
}

/// The authenticated caller, inserted into request extensions by
/// [`bearer_auth_mw`] for downstream handlers to read via `Extension<AuthedUser>`.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
}

impl AuthState {
    pub fn new(registry: TokenRegistry, max_per_minute: u32, burst: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(max_per_minute.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
        Self { registry: Arc::new(registry), limiter: Arc::new(RateLimiter::keyed(quota)) }
    }
}

/// Axum middleware verifying the bearer token and attaching the resolved
/// `user_id` to the request's extensions.
///
/// Returns `401 Unauthorized` on missing/wrong token, `429 Too Many
/// Requests` once the per-IP failure rate limit trips.
pub async fn bearer_auth_mw(
    State(auth): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let provided = extract_bearer(req.headers());
    let resolved = provided.and_then(|t| auth.registry.resolve(t));

    match resolved {
        Some(user_id) => {
            req.extensions_mut().insert(AuthedUser { user_id: user_id.to_string() });
            next.run(req).await
        }
        None => {
            let ip = addr.ip();
            if !is_loopback(ip) && auth.limiter.check_key(&ip).is_err() {
                warn!(%ip, "rate limit exceeded after repeated auth failures");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(axum::http::header::RETRY_AFTER, "60")],
                    "Too Many Requests",
                )
                    .into_response();
            }
            warn!(%ip, "authentication failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_from_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer my-token-123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("my-token-123"));
    }

    #[test]
    fn extract_bearer_missing_header() {
        assert!(extract_bearer(&HeaderMap::new()).is_none());
    }

    #[test]
    fn extract_bearer_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(extract_bearer(&headers).is_none());
    }

    #[test]
    fn loopback_v4_is_loopback() {
        assert!(is_loopback(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn non_loopback_is_not_loopback() {
        assert!(!is_loopback("192.168.1.1".parse().unwrap()));
    }
}
