// SPDX-License-Identifier: Apache-2.0
//! The sole mutator of plan state: a single-consumer command loop owning
//! every active plan's run task, a cheap-clone handle for callers, and a
//! `resume_all` startup routine that re-enters every non-terminal plan so
//! plans survive a process restart.

mod agents;
mod command;
mod digest;
mod error;
mod runner;
mod stream_event;

pub use agentforge_plan::TeamConfig;
pub use command::{OrchestratorCommand, OrchestratorHandle, Reply};
pub use error::OrchestratorError;
pub use runner::PlanControl;
pub use stream_event::{HeartbeatPayload, StreamDeltaPayload, StreamEvent};

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use agentforge_config::{ModelConfig, OrchestratorConfig};
use agentforge_core::AgentTurnResult;
use agentforge_mcp::McpClient;
use agentforge_model::{Message, ModelProvider};
use agentforge_plan::{DatasetHandle, Plan, PlanEvent, PlanStatus, Step};
use agentforge_store::{typed, DocumentKind, ListFilter, Store};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use agents::{build_agent, parse_planner_output};
use runner::{run_plan, RunPlanDeps};

const NONE_FILTER: ListFilter = None;

/// Everything a command handler needs, cheaply `Arc`-clonable into a spawned
/// task so a slow planner LLM call doesn't hold up unrelated `Approve`/
/// `Cancel` commands for other plans.
struct Shared {
    store: Arc<dyn Store>,
    mcp: Arc<dyn McpClient>,
    provider: Arc<dyn ModelProvider>,
    orchestrator_cfg: OrchestratorConfig,
    model_cfg: ModelConfig,
    events_tx: broadcast::Sender<(String, StreamEvent)>,
    semaphore: Arc<Semaphore>,
    controls: Arc<AsyncMutex<HashMap<String, Arc<PlanControl>>>>,
    /// `plan_id -> session_id`. `Plan` documents are partitioned by
    /// `session_id`, but `Approve`/`Clarify`/`Cancel` only
    /// carry a `plan_id` — this map resolves the partition without a
    /// cross-session store scan on every command. Populated at creation and
    /// at `resume_all`; entries are never evicted (plan ids are never
    /// reused, so the map's growth is bounded by total plans ever created).
    plan_sessions: Arc<AsyncMutex<HashMap<String, String>>>,
}

/// The orchestrator hub: one process-wide instance, driving its command loop
/// from [`Orchestrator::run`]. Construct with [`Orchestrator::new`], hand out
/// [`OrchestratorHandle`] clones to the gateway, then call `run`.
pub struct Orchestrator {
    cmd_rx: mpsc::Receiver<OrchestratorCommand>,
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        mcp: Arc<dyn McpClient>,
        provider: Arc<dyn ModelProvider>,
        orchestrator_cfg: OrchestratorConfig,
        model_cfg: ModelConfig,
    ) -> (Self, OrchestratorHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (events_tx, _) = broadcast::channel(1024);
        let semaphore = Arc::new(Semaphore::new(orchestrator_cfg.max_concurrent_plans));

        let handle = OrchestratorHandle { cmd_tx, events_tx: events_tx.clone() };

        let shared = Arc::new(Shared {
            store,
            mcp,
            provider,
            orchestrator_cfg,
            model_cfg,
            events_tx,
            semaphore,
            controls: Arc::new(AsyncMutex::new(HashMap::new())),
            plan_sessions: Arc::new(AsyncMutex::new(HashMap::new())),
        });

        (Self { cmd_rx, shared }, handle)
    }

    /// Runs the command loop until every [`OrchestratorHandle`] has been
    /// dropped and the channel closes. Replays non-terminal plans first.
    pub async fn run(mut self) {
        Shared::resume_all(&self.shared).await;

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                OrchestratorCommand::CreatePlan { session_id, team_id, user_request, facts, reply } => {
                    // The planner LLM round-trip can take seconds; spawning
                    // keeps Approve/Clarify/Cancel for other plans responsive.
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let result = Shared::handle_create_plan(&shared, session_id, team_id, user_request, facts).await;
                        let _ = reply.send(result);
                    });
                }
                OrchestratorCommand::ApprovePlan { plan_id, reply } => {
                    let result = Shared::handle_approve_plan(&self.shared, plan_id).await;
                    let _ = reply.send(result);
                }
                OrchestratorCommand::Clarify { plan_id, answer, reply } => {
                    let result = Shared::handle_clarify(&self.shared, plan_id, answer).await;
                    let _ = reply.send(result);
                }
                OrchestratorCommand::Cancel { plan_id, reply } => {
                    let result = Shared::handle_cancel(&self.shared, plan_id).await;
                    let _ = reply.send(result);
                }
            }
        }
    }
}

impl Shared {
    async fn lookup_session(&self, plan_id: &str) -> Result<String, OrchestratorError> {
        self.plan_sessions
            .lock()
            .await
            .get(plan_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::PlanNotFound(plan_id.to_string()))
    }

    async fn load_team(&self, team_id: &str) -> Result<agentforge_plan::TeamConfig, OrchestratorError> {
        typed::get(self.store.as_ref(), DocumentKind::TeamConfig, team_id, team_id)
            .await?
            .ok_or_else(|| OrchestratorError::TeamNotFound(team_id.to_string()))
    }

    /// Resolves the team, rejects an empty request or a second concurrent
    /// plan for the same session, optionally summarizes the session's prior
    /// terminal plan, invokes the planner agent, and persists the result in
    /// `AwaitingApproval`.
    async fn handle_create_plan(
        shared: &Arc<Shared>,
        session_id: String,
        team_id: String,
        user_request: String,
        facts_hint: Value,
    ) -> Result<Plan, OrchestratorError> {
        if user_request.trim().is_empty() {
            return Err(OrchestratorError::ValidationError("user_request must not be empty".to_string()));
        }

        let team = shared.load_team(&team_id).await?;
        let planner_spec = team
            .planner()
            .cloned()
            .ok_or_else(|| OrchestratorError::ValidationError(format!("team {team_id:?} has no agents")))?;

        let existing: Vec<Plan> = typed::list(shared.store.as_ref(), DocumentKind::Plan, &session_id, NONE_FILTER).await?;
        if existing.iter().any(|p| !p.overall_status.is_terminal()) {
            return Err(OrchestratorError::ValidationError(format!(
                "session {session_id:?} already has an active plan"
            )));
        }
        let prior_summary = existing
            .iter()
            .filter(|p| p.overall_status.is_terminal())
            .max_by_key(|p| p.updated_at)
            .and_then(|p| p.final_result.as_deref())
            .filter(|r| !r.is_empty())
            .map(|r| agentforge_core::smart_truncate(r, 500));

        let dataset_handles: Vec<DatasetHandle> =
            typed::list(shared.store.as_ref(), DocumentKind::Dataset, &session_id, NONE_FILTER).await?;
        let dataset_message = agentforge_core::dataset_context_message(&dataset_handles);

        let mut planner = build_agent(
            &planner_spec,
            Arc::clone(&shared.provider),
            Arc::clone(&shared.mcp),
            shared.model_cfg.context_window,
            shared.orchestrator_cfg.per_step_turn_cap as u32,
            Duration::from_secs(shared.orchestrator_cfg.agent_turn_timeout_seconds),
        );
        planner.inject_dataset_context(dataset_message);

        let prompt = build_planner_prompt(&user_request, &team, prior_summary.as_deref(), &facts_hint);
        let turn_result = planner.turn(Some(Message::user(prompt)), None).await;
        let text = match turn_result {
            AgentTurnResult::Final(text) => text,
            other => {
                return Err(OrchestratorError::ValidationError(format!(
                    "planner did not return a final plan ({other:?})"
                )))
            }
        };

        let (facts, steps) = parse_planner_output(&text, &team, shared.orchestrator_cfg.planner_max_steps)?;

        let plan_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let plan_steps: Vec<Step> = steps
            .into_iter()
            .enumerate()
            .map(|(i, (agent_name, action))| Step::new(Uuid::new_v4().to_string(), (i + 1) as u32, agent_name, action))
            .collect();
        let step_count = plan_steps.len();

        let mut plan = Plan::new(plan_id.clone(), session_id.clone(), team_id, user_request.clone(), facts.clone(), plan_steps, now);
        plan.try_transition(PlanStatus::AwaitingApproval, now).ok();
        typed::put(shared.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id, &plan).await?;

        shared.plan_sessions.lock().await.insert(plan_id.clone(), session_id.clone());

        typed::put(
            shared.store.as_ref(),
            DocumentKind::Message,
            &Uuid::new_v4().to_string(),
            &session_id,
            &agentforge_plan::Message::new(
                session_id.clone(),
                Some(plan_id.clone()),
                agentforge_plan::MessageKind::UserRequest,
                None,
                agentforge_plan::MessageBody::Text(user_request),
                now,
            ),
        )
        .await?;

        let _ = shared.events_tx.send((
            session_id,
            StreamEvent::Plan(PlanEvent::PlanCreated { plan_id, timestamp: now, facts, step_count }),
        ));

        Ok(plan)
    }

    /// Execution mode: idempotent on a plan that's already running or
    /// finished; otherwise claims the plan by transitioning it to `Running`
    /// and persisting that synchronously, then spawns `run_plan` to execute
    /// it. Claiming happens here rather than inside the spawned task so a
    /// second `Approve` arriving before the spawned task gets scheduled
    /// observes `Running` (and no-ops) instead of `AwaitingApproval` (and
    /// spawns a second, racing run).
    async fn handle_approve_plan(shared: &Arc<Shared>, plan_id: String) -> Result<Plan, OrchestratorError> {
        let session_id = shared.lookup_session(&plan_id).await?;
        let mut plan: Plan = typed::get_required(shared.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id).await?;

        if plan.overall_status.is_terminal() {
            return Err(OrchestratorError::ValidationError(format!("plan {plan_id:?} already finished")));
        }
        if plan.overall_status != PlanStatus::AwaitingApproval {
            // Duplicate Approve against an already-claimed plan: no-op.
            return Ok(plan);
        }

        let team = shared.load_team(&plan.team_id).await?;
        plan.try_transition(PlanStatus::Running, Utc::now()).ok();
        typed::put(shared.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id, &plan).await?;

        Shared::spawn_run(shared, plan_id, session_id, team).await;
        Ok(plan)
    }

    async fn spawn_run(shared: &Arc<Shared>, plan_id: String, session_id: String, team: agentforge_plan::TeamConfig) {
        let control = Arc::new(PlanControl::new());
        shared.controls.lock().await.insert(plan_id.clone(), Arc::clone(&control));

        let deps = RunPlanDeps {
            store: Arc::clone(&shared.store),
            mcp: Arc::clone(&shared.mcp),
            provider: Arc::clone(&shared.provider),
            team,
            orchestrator_cfg: shared.orchestrator_cfg.clone(),
            model_cfg: shared.model_cfg.clone(),
            events_tx: shared.events_tx.clone(),
            semaphore: Arc::clone(&shared.semaphore),
            control,
            controls: Arc::clone(&shared.controls),
        };
        tokio::spawn(run_plan(plan_id, session_id, deps));
    }

    async fn handle_clarify(shared: &Shared, plan_id: String, answer: String) -> Result<Plan, OrchestratorError> {
        let session_id = shared.lookup_session(&plan_id).await?;
        let plan: Plan = typed::get_required(shared.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id).await?;

        let control = shared.controls.lock().await.get(&plan_id).cloned();
        let Some(control) = control else {
            return Err(OrchestratorError::ValidationError(format!("plan {plan_id:?} is not awaiting clarification")));
        };
        let tx = control.clarify_tx.lock().await.take();
        let Some(tx) = tx else {
            return Err(OrchestratorError::ValidationError(format!("plan {plan_id:?} is not awaiting clarification")));
        };
        let _ = tx.send(answer);
        Ok(plan)
    }

    /// Cancellation: a plan still `AwaitingApproval` is
    /// cancelled synchronously since no task is running yet; a `Running`/
    /// `AwaitingClarification` plan is signalled cooperatively, with a hard
    /// deadline after which the running task is force-aborted.
    async fn handle_cancel(shared: &Arc<Shared>, plan_id: String) -> Result<Plan, OrchestratorError> {
        let session_id = shared.lookup_session(&plan_id).await?;
        let mut plan: Plan = typed::get_required(shared.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id).await?;

        if plan.overall_status.is_terminal() {
            return Ok(plan);
        }

        if plan.overall_status == PlanStatus::AwaitingApproval {
            let now = Utc::now();
            plan.request_cancellation();
            plan.try_transition(PlanStatus::Cancelled, now).ok();
            typed::put(shared.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id, &plan).await?;
            let _ = shared
                .events_tx
                .send((session_id, StreamEvent::Plan(PlanEvent::PlanCancelled { plan_id, timestamp: now })));
            return Ok(plan);
        }

        if let Some(control) = shared.controls.lock().await.get(&plan_id).cloned() {
            control.request_cancellation();
            let hard_deadline = Duration::from_secs(shared.orchestrator_cfg.cancel_hard_deadline_seconds);
            tokio::spawn(async move {
                tokio::time::sleep(hard_deadline).await;
                if !control.finished.load(Ordering::SeqCst) {
                    control.force_abort();
                }
            });
        }
        Ok(plan)
    }

    /// Startup resumption: re-enters every
    /// non-terminal plan at its current cursor, replaying committed tool
    /// calls rather than re-invoking them (handled inside `run_plan_inner`).
    async fn resume_all(shared: &Arc<Shared>) {
        let sessions = match shared.store.list_partitions(DocumentKind::Plan).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to list plan partitions during resumption");
                return;
            }
        };

        for session_id in sessions {
            let plans: Vec<Plan> = match typed::list(shared.store.as_ref(), DocumentKind::Plan, &session_id, NONE_FILTER).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(%session_id, error = %e, "failed to list plans during resumption");
                    continue;
                }
            };
            for plan in plans {
                shared.plan_sessions.lock().await.insert(plan.plan_id.clone(), session_id.clone());
                if !matches!(plan.overall_status, PlanStatus::Running | PlanStatus::AwaitingClarification) {
                    continue;
                }
                let team = match shared.load_team(&plan.team_id).await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(plan_id = %plan.plan_id, error = %e, "failed to resume plan: team missing");
                        continue;
                    }
                };
                info!(plan_id = %plan.plan_id, %session_id, "resuming non-terminal plan");
                Shared::spawn_run(shared, plan.plan_id.clone(), session_id.clone(), team).await;
            }
        }
    }
}

fn build_planner_prompt(
    user_request: &str,
    team: &agentforge_plan::TeamConfig,
    prior_summary: Option<&str>,
    facts_hint: &Value,
) -> String {
    let agent_roster = team.agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ");
    let mut prompt = format!(
        "User request: {user_request}\n\n\
         Available agents, in the order they should run if all are needed: {agent_roster}\n\n\
         Respond with a single JSON object: {{\"facts\": \"<one short paragraph of grounding \
         facts every step's agent should share>\", \"steps\": [{{\"agent_name\": \"<one of the \
         available agents>\", \"action\": \"<what they should do>\"}}]}}. Use only agent names \
         from the list above."
    );
    if let Some(summary) = prior_summary {
        prompt.push_str(&format!("\n\nThe prior plan in this session ended with: {summary}"));
    }
    if !facts_hint.is_null() {
        prompt.push_str(&format!("\n\nCaller-supplied context: {facts_hint}"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentforge_mcp::FakeMcpClient;
    use agentforge_model::ScriptedMockProvider;
    use agentforge_plan::AgentSpec;
    use agentforge_store::InMemoryStore;

    fn team() -> agentforge_plan::TeamConfig {
        agentforge_plan::TeamConfig {
            team_id: "team1".into(),
            name: "Analysis Team".into(),
            agents: vec![
                AgentSpec::new("Planner", "you plan").without_tools(),
                AgentSpec::new("Executor", "you execute"),
            ],
        }
    }

    async fn wired() -> (Orchestrator, OrchestratorHandle, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        typed::put(store.as_ref(), DocumentKind::TeamConfig, "team1", "team1", &team()).await.unwrap();

        let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text(
            r#"{"facts":"dataset has 3 columns","steps":[{"agent_name":"Executor","action":"summarize it"}]}"#,
        ));
        let mcp: Arc<dyn McpClient> = Arc::new(FakeMcpClient::new());
        let (orchestrator, handle) =
            Orchestrator::new(Arc::clone(&store), mcp, provider, OrchestratorConfig::default(), ModelConfig::default());
        (orchestrator, handle, store)
    }

    #[tokio::test]
    async fn create_plan_persists_awaiting_approval() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        let plan = handle.create_plan("session-1", "team1", "summarize my data", Value::Null).await.unwrap();
        assert_eq!(plan.overall_status, PlanStatus::AwaitingApproval);
        assert_eq!(plan.facts, "dataset has 3 columns");
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn create_plan_rejects_unknown_team() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        let err = handle.create_plan("session-1", "ghost-team", "do something", Value::Null).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TeamNotFound(_)));
    }

    #[tokio::test]
    async fn create_plan_rejects_second_active_plan_in_same_session() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        handle.create_plan("session-1", "team1", "first request", Value::Null).await.unwrap();
        let err = handle.create_plan("session-1", "team1", "second request", Value::Null).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationError(_)));
    }

    #[tokio::test]
    async fn approve_plan_runs_it_to_completion() {
        let (orchestrator, handle, store) = wired().await;
        tokio::spawn(orchestrator.run());

        let plan = handle.create_plan("session-1", "team1", "summarize my data", Value::Null).await.unwrap();
        let approved = handle.approve_plan(&plan.plan_id).await.unwrap();
        assert_ne!(approved.overall_status, PlanStatus::AwaitingApproval);

        for _ in 0..20 {
            let current: Plan = typed::get_required(store.as_ref(), DocumentKind::Plan, &plan.plan_id, "session-1").await.unwrap();
            if current.overall_status.is_terminal() {
                assert_eq!(current.overall_status, PlanStatus::Completed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("plan did not reach a terminal status in time");
    }

    #[tokio::test]
    async fn create_plan_rejects_blank_user_request() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        let err = handle.create_plan("session-1", "team1", "   ", Value::Null).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationError(_)));
    }

    #[tokio::test]
    async fn double_approve_does_not_spawn_two_runs() {
        let (orchestrator, handle, store) = wired().await;
        tokio::spawn(orchestrator.run());

        let plan = handle.create_plan("session-1", "team1", "summarize my data", Value::Null).await.unwrap();
        let (first, second) = tokio::join!(handle.approve_plan(&plan.plan_id), handle.approve_plan(&plan.plan_id));
        let first = first.unwrap();
        let second = second.unwrap();
        assert_ne!(first.overall_status, PlanStatus::AwaitingApproval);
        assert_ne!(second.overall_status, PlanStatus::AwaitingApproval);

        for _ in 0..20 {
            let current: Plan = typed::get_required(store.as_ref(), DocumentKind::Plan, &plan.plan_id, "session-1").await.unwrap();
            if current.overall_status.is_terminal() {
                assert_eq!(current.overall_status, PlanStatus::Completed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("plan did not reach a terminal status in time");
    }

    #[tokio::test]
    async fn approve_unknown_plan_is_not_found() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        let err = handle.approve_plan("ghost-plan").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PlanNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_before_approval_is_immediate() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        let plan = handle.create_plan("session-1", "team1", "summarize my data", Value::Null).await.unwrap();
        let cancelled = handle.cancel(&plan.plan_id).await.unwrap();
        assert_eq!(cancelled.overall_status, PlanStatus::Cancelled);
    }

    #[tokio::test]
    async fn clarify_on_a_plan_with_no_pending_question_is_an_error() {
        let (orchestrator, handle, _store) = wired().await;
        tokio::spawn(orchestrator.run());

        let plan = handle.create_plan("session-1", "team1", "summarize my data", Value::Null).await.unwrap();
        let err = handle.clarify(&plan.plan_id, "the answer").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationError(_)));
    }
}
