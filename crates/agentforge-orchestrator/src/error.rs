// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Boundary error taxonomy for the orchestrator's command handlers. These are
/// returned synchronously from [`crate::OrchestratorHandle`] calls and never
/// mutate persisted state — contrast with [`agentforge_plan::ErrorKind`],
/// which is recorded against an already-persisted step/plan.
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error("team {0:?} not found")]
    TeamNotFound(String),

    #[error("plan {0:?} not found")]
    PlanNotFound(String),

    #[error("session {0:?} not found")]
    SessionNotFound(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("orchestrator service has shut down")]
    ServiceShutDown,
}

impl From<agentforge_store::StoreError> for OrchestratorError {
    fn from(e: agentforge_store::StoreError) -> Self {
        match e {
            agentforge_store::StoreError::NotFound { id, .. } => OrchestratorError::PlanNotFound(id),
            other => OrchestratorError::Persistence(other.to_string()),
        }
    }
}
