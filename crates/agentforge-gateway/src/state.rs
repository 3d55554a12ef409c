// SPDX-License-Identifier: Apache-2.0
//! Shared application state threaded through every Axum handler via
//! `State<AppState>`.

use std::sync::Arc;

use agentforge_orchestrator::OrchestratorHandle;
use agentforge_plan::Session;
use agentforge_store::{DocumentKind, Store};
use chrono::Utc;

use crate::auth::AuthState;
use crate::blob::BlobStore;
use crate::error::GatewayError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub orchestrator: OrchestratorHandle,
    pub auth: AuthState,
    pub blob: Arc<dyn BlobStore>,
    pub heartbeat_interval_seconds: u64,
    pub event_subscriber_lag_threshold: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        orchestrator: OrchestratorHandle,
        auth: AuthState,
        blob: Arc<dyn BlobStore>,
        heartbeat_interval_seconds: u64,
        event_subscriber_lag_threshold: usize,
    ) -> Self {
        Self { store, orchestrator, auth, blob, heartbeat_interval_seconds, event_subscriber_lag_threshold }
    }

    /// Resolves the owner of `session_id`, creating the session (owned by
    /// `user_id`) on first contact. Every subsequent call with a different
    /// `user_id` for the same session is rejected — a session cannot change
    /// owners.
    pub async fn authorize_session(&self, session_id: &str, user_id: &str) -> Result<(), GatewayError> {
        let now = Utc::now();
        let user_id_owned = user_id.to_string();
        let session: Session = agentforge_store::typed::patch(
            self.store.as_ref(),
            DocumentKind::Session,
            session_id,
            session_id,
            5,
            move |current| match current {
                Some(existing) => Ok(existing),
                None => Ok(Session::new(session_id, user_id_owned.clone(), now)),
            },
        )
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

        if session.owner_user_id != user_id {
            return Err(GatewayError::Forbidden(format!(
                "session {session_id:?} is owned by a different user"
            )));
        }
        Ok(())
    }
}
