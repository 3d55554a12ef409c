// SPDX-License-Identifier: Apache-2.0
//! The session gateway: the only component the client ever talks to
//! directly. Authenticates, resolves a `user_id`, enforces session
//! ownership, and bridges HTTP commands / a WebSocket event stream onto an
//! [`agentforge_orchestrator::OrchestratorHandle`].
//!
//! [`run`] follows a "load-or-bootstrap token, print once, then serve"
//! startup sequence.

mod auth;
mod blob;
mod error;
mod routes;
mod security;
mod state;
mod token;
mod ws;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use agentforge_config::GatewayConfig;
use agentforge_orchestrator::OrchestratorHandle;
use agentforge_store::Store;

pub use auth::{AuthState, AuthedUser};
pub use blob::{BlobError, BlobStore, LocalBlobStore};
pub use error::GatewayError;
pub use state::AppState;
pub use token::{RawToken, RegisteredUser, TokenRegistry};

/// Request bodies above this size are rejected before a handler runs
/// (dataset uploads are the only large-body route; 64 MiB comfortably
/// covers the tabular files this core expects while bounding memory use
/// per in-flight upload).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Assembles the gateway's router and serves it until the process is
/// signaled to stop. Blocks on the HTTP server.
pub async fn run(
    config: GatewayConfig,
    store: Arc<dyn Store>,
    orchestrator: OrchestratorHandle,
    blob_dir: std::path::PathBuf,
) -> anyhow::Result<()> {
    let token_path = config
        .token_file
        .clone()
        .unwrap_or_else(default_token_path);
    let (registry, minted) = TokenRegistry::load_or_bootstrap(&token_path)?;
    if let Some(raw) = minted {
        info!("=======================================================");
        info!("Gateway bearer token (shown once — save it now!):");
        info!("  {}", raw.as_str());
        info!("=======================================================");
    }

    let auth = AuthState::new(registry, config.auth_rate_limit_per_minute, config.auth_rate_limit_burst);
    let blob: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blob_dir));
    let state = AppState::new(
        store,
        orchestrator,
        auth.clone(),
        blob,
        config.heartbeat_interval_seconds,
        config.event_subscriber_lag_threshold,
    );

    let app = router(state, auth);

    info!(bind = %config.bind, "starting session gateway");
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds the gateway's `Router` without binding a listener — split out
/// from [`run`] so integration tests can drive it in-process via
/// `tower::ServiceExt::oneshot`.
pub fn router(state: AppState, auth: AuthState) -> Router {
    Router::new()
        .route("/sessions/:session_id/datasets", post(routes::upload_dataset))
        .route("/sessions/:session_id/plans", post(routes::create_plan))
        .route("/sessions/:session_id/plans/:plan_id", get(routes::get_plan))
        .route("/sessions/:session_id/plans/:plan_id/approve", post(routes::approve_plan))
        .route("/sessions/:session_id/plans/:plan_id/clarify", post(routes::clarify_plan))
        .route("/sessions/:session_id/plans/:plan_id/cancel", post(routes::cancel_plan))
        .route("/sessions/:session_id/history", get(routes::get_history))
        .route("/sessions/:session_id/stream", get(ws::stream_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
        .layer(middleware::from_fn(security::csrf_guard))
        .layer(middleware::from_fn(security::security_headers))
        .layer(middleware::from_fn_with_state(auth, auth::bearer_auth_mw))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static("x-request-id")))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(HeaderName::from_static("x-request-id"), MakeRequestUuid))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let _ = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn default_token_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".config/agentforge/gateway/token.yaml")
}
