// SPDX-License-Identifier: Apache-2.0
//! The command channel into the [`crate::Orchestrator`]: a
//! `(OrchestratorCommand, Reply)` tuple-in-channel pattern where every
//! variant carries its own reply channel, since `ValidationError`/`*NotFound`
//! must be returned synchronously to the caller and the gateway's HTTP
//! handlers need a real value (or error) to turn into a status code, not
//! just a fire-and-forget broadcast event.

use agentforge_plan::Plan;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::OrchestratorError;
use crate::stream_event::StreamEvent;

pub type Reply<T> = oneshot::Sender<Result<T, OrchestratorError>>;

#[derive(Debug)]
pub enum OrchestratorCommand {
    CreatePlan {
        session_id: String,
        team_id: String,
        user_request: String,
        facts: Value,
        reply: Reply<Plan>,
    },
    ApprovePlan {
        plan_id: String,
        reply: Reply<Plan>,
    },
    Clarify {
        plan_id: String,
        answer: String,
        reply: Reply<Plan>,
    },
    Cancel {
        plan_id: String,
        reply: Reply<Plan>,
    },
}

/// A cheap-clone front door onto a running [`crate::Orchestrator`] — the
/// gateway's only dependency on the orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    pub(crate) cmd_tx: mpsc::Sender<OrchestratorCommand>,
    pub(crate) events_tx: broadcast::Sender<(String, StreamEvent)>,
}

impl OrchestratorHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> OrchestratorCommand) -> Result<T, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| OrchestratorError::ServiceShutDown)?;
        rx.await.map_err(|_| OrchestratorError::ServiceShutDown)?
    }

    pub async fn create_plan(
        &self,
        session_id: impl Into<String>,
        team_id: impl Into<String>,
        user_request: impl Into<String>,
        facts: Value,
    ) -> Result<Plan, OrchestratorError> {
        let session_id = session_id.into();
        let team_id = team_id.into();
        let user_request = user_request.into();
        self.call(|reply| OrchestratorCommand::CreatePlan { session_id, team_id, user_request, facts, reply })
            .await
    }

    pub async fn approve_plan(&self, plan_id: impl Into<String>) -> Result<Plan, OrchestratorError> {
        let plan_id = plan_id.into();
        self.call(|reply| OrchestratorCommand::ApprovePlan { plan_id, reply }).await
    }

    pub async fn clarify(&self, plan_id: impl Into<String>, answer: impl Into<String>) -> Result<Plan, OrchestratorError> {
        let plan_id = plan_id.into();
        let answer = answer.into();
        self.call(|reply| OrchestratorCommand::Clarify { plan_id, answer, reply }).await
    }

    pub async fn cancel(&self, plan_id: impl Into<String>) -> Result<Plan, OrchestratorError> {
        let plan_id = plan_id.into();
        self.call(|reply| OrchestratorCommand::Cancel { plan_id, reply }).await
    }

    /// Subscribe to the global event stream. Every event is tagged with the
    /// owning session id so a gateway handler can filter down to the single
    /// session a client connected for.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, StreamEvent)> {
        self.events_tx.subscribe()
    }
}
