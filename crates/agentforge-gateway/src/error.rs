// SPDX-License-Identifier: Apache-2.0
//! HTTP-facing error taxonomy, translating [`OrchestratorError`] and local
//! validation failures into status codes — one `kind`-driven match, never a
//! string match on a message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use agentforge_orchestrator::OrchestratorError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("team {0:?} not found")]
    TeamNotFound(String),

    #[error("plan {0:?} not found")]
    PlanNotFound(String),

    #[error("session {0:?} not found")]
    SessionNotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<OrchestratorError> for GatewayError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::TeamNotFound(t) => GatewayError::TeamNotFound(t),
            OrchestratorError::PlanNotFound(p) => GatewayError::PlanNotFound(p),
            OrchestratorError::SessionNotFound(s) => GatewayError::SessionNotFound(s),
            OrchestratorError::ValidationError(msg) => GatewayError::Validation(msg),
            OrchestratorError::Persistence(msg) => GatewayError::Internal(msg),
            OrchestratorError::ServiceShutDown => {
                GatewayError::Internal("orchestrator service has shut down".to_string())
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GatewayError::TeamNotFound(_) | GatewayError::PlanNotFound(_) | GatewayError::SessionNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            GatewayError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            GatewayError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
