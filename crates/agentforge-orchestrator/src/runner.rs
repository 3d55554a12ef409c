// SPDX-License-Identifier: Apache-2.0
//! The per-plan execution task: one `tokio::spawn`ed instance per approved
//! plan, owning a whole plan from `Running` to a terminal status and
//! rebuilding a fresh `Agent` for each step from that step's `AgentSpec`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentforge_config::{ModelConfig, OrchestratorConfig};
use agentforge_core::{Agent, AgentEvent, AgentTurnResult, TurnFailureKind};
use agentforge_mcp::McpClient;
use agentforge_model::{Message, ModelProvider};
use agentforge_plan::{
    DatasetHandle, ErrorKind, Message as PlanMessage, MessageBody as PlanMessageBody, MessageKind as PlanMessageKind, Plan, PlanEvent,
    PlanStatus, StepStatus, TeamConfig, ToolCallRecord,
};
use agentforge_store::{typed, DocumentKind, ListFilter, Store};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as AsyncMutex, Notify, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{build_agent, compute_allow_list};
use crate::digest::{digest_json, digest_str};
use crate::stream_event::{StreamDeltaPayload, StreamEvent};

/// The infinite-clarification-loop guard: more than this many clarification
/// round-trips against the same step fails the step with
/// `ErrorKind::ClarificationLoop` instead of looping forever.
const MAX_CLARIFICATIONS_PER_STEP: u32 = 2;

/// Tool results longer than this are truncated (keeping head and tail) before
/// they enter an agent's context window — the digest stored on
/// `ToolCallRecord` is computed from the untruncated text, so replay can
/// still reference the full result's identity even though the live window
/// only ever saw the truncated form.
const TOOL_RESULT_CAP_CHARS: usize = 8_000;

/// Per-plan cancellation/clarification control surface, held both by the
/// `Orchestrator` hub (to signal into a running plan) and by the plan's own
/// `run_plan` task (to observe those signals): one cooperative-cancel-plus-
/// forced-abort pair and one clarification channel.
pub struct PlanControl {
    pub cancellation_requested: AtomicBool,
    pub force_abort_requested: AtomicBool,
    pub finished: AtomicBool,
    pub wake: Notify,
    pub clarify_tx: AsyncMutex<Option<oneshot::Sender<String>>>,
}

impl PlanControl {
    pub fn new() -> Self {
        Self {
            cancellation_requested: AtomicBool::new(false),
            force_abort_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            wake: Notify::new(),
            clarify_tx: AsyncMutex::new(None),
        }
    }

    pub fn request_cancellation(&self) {
        self.cancellation_requested.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn force_abort(&self) {
        self.force_abort_requested.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }
}

impl Default for PlanControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything `run_plan` needs that's shared across every plan in the
/// process, bundled so the spawn call site isn't an eight-argument tuple.
pub struct RunPlanDeps {
    pub store: Arc<dyn Store>,
    pub mcp: Arc<dyn McpClient>,
    pub provider: Arc<dyn ModelProvider>,
    pub team: TeamConfig,
    pub orchestrator_cfg: OrchestratorConfig,
    pub model_cfg: ModelConfig,
    pub events_tx: broadcast::Sender<(String, StreamEvent)>,
    pub semaphore: Arc<Semaphore>,
    pub control: Arc<PlanControl>,
    pub controls: Arc<AsyncMutex<std::collections::HashMap<String, Arc<PlanControl>>>>,
}

enum TurnOutcome {
    Turn(AgentTurnResult),
    ForcedAbort,
}

/// Drives one plan from `AwaitingApproval` to a terminal status. Acquires a
/// `max_concurrent_plans` permit before transitioning to `Running` (plans
/// queue in `AwaitingApproval` rather than all running at once), then
/// executes steps in ordinal order until the plan's cursor runs out, a step
/// fails, or cancellation/deadline intervenes.
pub async fn run_plan(plan_id: String, session_id: String, deps: RunPlanDeps) {
    let _permit = match deps.semaphore.acquire_owned().await {
        Ok(p) => p,
        Err(_) => return, // semaphore closed: process is shutting down
    };

    if let Err(e) = run_plan_inner(&plan_id, &session_id, &deps).await {
        warn!(%plan_id, error = %e, "plan run ended with an unhandled persistence error");
    }

    deps.control.finished.store(true, Ordering::SeqCst);
    deps.controls.lock().await.remove(&plan_id);
}

async fn run_plan_inner(plan_id: &str, session_id: &str, deps: &RunPlanDeps) -> Result<(), agentforge_store::StoreError> {
    let mut plan: Plan = typed::get_required(deps.store.as_ref(), DocumentKind::Plan, plan_id, session_id).await?;

    if plan.try_transition(PlanStatus::Running, Utc::now()).is_err() {
        // Already terminal (e.g. cancelled while we waited for a permit).
        return Ok(());
    }
    // No-op if the plan was already marked Running by the caller that
    // claimed and spawned it; still cheap to persist again.
    persist_plan(deps, &plan).await?;

    let dataset_handles: Vec<DatasetHandle> =
        typed::list(deps.store.as_ref(), DocumentKind::Dataset, session_id, ListFilter::None).await?;
    let dataset_message = agentforge_core::dataset_context_message(&dataset_handles);

    let deadline = deps.orchestrator_cfg.plan_deadline_seconds;
    let started = tokio::time::Instant::now();

    let mut clarifications_this_step: u32 = 0;
    let mut last_step_id: Option<String> = None;

    'plan: loop {
        if tokio::time::Instant::now().duration_since(started) > Duration::from_secs(deadline) {
            fail_plan(deps, &mut plan, ErrorKind::Agent, "plan deadline exceeded").await?;
            break;
        }

        let Some(step_idx) = plan.current_step else {
            // No more steps: success iff every step finished cleanly.
            if plan.all_steps_terminal_success() {
                let final_result = plan
                    .steps
                    .last()
                    .and_then(|s| s.output_text.clone())
                    .unwrap_or_default();
                plan.final_result = Some(final_result.clone());
                let now = Utc::now();
                plan.try_transition(PlanStatus::Completed, now).ok();
                persist_plan(deps, &plan).await?;
                record_message(
                    deps,
                    session_id,
                    plan_id,
                    PlanMessageKind::FinalResult,
                    None,
                    PlanMessageBody::Text(final_result.clone()),
                )
                .await?;
                broadcast_event(deps, session_id, PlanEvent::PlanCompleted { plan_id: plan_id.into(), timestamp: now, final_result });
            } else {
                fail_plan(deps, &mut plan, ErrorKind::Agent, "plan ended with an unresolved step").await?;
            }
            break;
        };

        if last_step_id.as_deref() != Some(plan.steps[step_idx].step_id.as_str()) {
            clarifications_this_step = 0;
            last_step_id = Some(plan.steps[step_idx].step_id.clone());
        }

        let agent_name = plan.steps[step_idx].agent_name.clone();
        let Some(spec) = deps.team.resolve(&agent_name).cloned() else {
            fail_plan(deps, &mut plan, ErrorKind::Agent, &format!("unknown agent {agent_name:?}")).await?;
            break;
        };

        if plan.steps[step_idx].status == StepStatus::Pending {
            let now = Utc::now();
            plan.steps[step_idx].status = StepStatus::Running;
            plan.steps[step_idx].started_at = Some(now);
            persist_plan(deps, &plan).await?;
            broadcast_event(
                deps,
                session_id,
                PlanEvent::StepStarted {
                    plan_id: plan_id.into(),
                    step_id: plan.steps[step_idx].step_id.clone(),
                    timestamp: now,
                    ordinal: plan.steps[step_idx].ordinal,
                    agent_name: agent_name.clone(),
                },
            );
        }

        let allow_list = compute_allow_list(&spec);
        let mut agent = build_agent(
            &spec,
            Arc::clone(&deps.provider),
            Arc::clone(&deps.mcp),
            deps.model_cfg.context_window,
            deps.orchestrator_cfg.per_step_turn_cap as u32,
            Duration::from_secs(deps.orchestrator_cfg.agent_turn_timeout_seconds),
        );
        agent.inject_dataset_context(dataset_message.clone());

        // Resumption replay: already-committed tool calls are
        // not re-invoked. Only digests survive a restart, so the replayed
        // tool-result content is a synthetic notice rather than the original
        // payload — enough for the model to know the call already happened.
        for tc in plan.steps[step_idx].tool_calls.clone() {
            let synthetic_id = Uuid::new_v4().to_string();
            agent.window.push(Message::tool_call(synthetic_id.clone(), tc.tool_name.clone(), "{\"_replayed\":true}"));
            agent.record_tool_result(
                synthetic_id,
                format!("[replayed] tool {} already completed (digest {}) in {}ms", tc.tool_name, tc.result_digest, tc.ms),
            );
        }

        let mut next_input = if plan.steps[step_idx].tool_calls.is_empty() {
            Some(Message::user(format!("User request: {}\n\nStep action: {}", plan.user_request, plan.steps[step_idx].action)))
        } else {
            None
        };

        'step: loop {
            if deps.control.cancellation_requested.load(Ordering::SeqCst) {
                plan.request_cancellation();
                let now = Utc::now();
                plan.try_transition(PlanStatus::Cancelled, now).ok();
                persist_plan(deps, &plan).await?;
                broadcast_event(deps, session_id, PlanEvent::PlanCancelled { plan_id: plan_id.into(), timestamp: now });
                break 'plan;
            }

            let (agent_tx, mut agent_rx) = mpsc::unbounded_channel::<AgentEvent>();
            let forward_plan_id = plan_id.to_string();
            let forward_step_id = plan.steps[step_idx].step_id.clone();
            let forward_session_id = session_id.to_string();
            let forward_events_tx = deps.events_tx.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = agent_rx.recv().await {
                    if let AgentEvent::TextDelta(delta) = event {
                        let payload = StreamDeltaPayload::new(&forward_plan_id, &forward_step_id, delta);
                        let _ = forward_events_tx.send((forward_session_id.clone(), StreamEvent::StreamDelta(payload)));
                    }
                }
            });

            let turn_fut = agent.turn(next_input.take(), Some(&agent_tx));
            tokio::pin!(turn_fut);
            let outcome = loop {
                tokio::select! {
                    _ = deps.control.wake.notified() => {
                        if deps.control.force_abort_requested.load(Ordering::SeqCst) {
                            break TurnOutcome::ForcedAbort;
                        }
                        if deps.control.cancellation_requested.load(Ordering::SeqCst) {
                            continue 'step;
                        }
                    }
                    result = &mut turn_fut => {
                        break TurnOutcome::Turn(result);
                    }
                }
            };
            drop(agent_tx);
            let _ = forwarder.await;

            let turn_result = match outcome {
                TurnOutcome::ForcedAbort => {
                    let now = Utc::now();
                    plan.try_transition(PlanStatus::Cancelled, now).ok();
                    persist_plan(deps, &plan).await?;
                    broadcast_event(deps, session_id, PlanEvent::PlanCancelled { plan_id: plan_id.into(), timestamp: now });
                    break 'plan;
                }
                TurnOutcome::Turn(r) => r,
            };

            match turn_result {
                AgentTurnResult::Final(text) => {
                    let now = Utc::now();
                    plan.steps[step_idx].status = StepStatus::Done;
                    plan.steps[step_idx].finished_at = Some(now);
                    plan.steps[step_idx].output_text = Some(text.clone());
                    plan.advance_cursor();
                    persist_plan(deps, &plan).await?;
                    record_message(
                        deps,
                        session_id,
                        plan_id,
                        PlanMessageKind::AgentOutput,
                        Some(agent_name.clone()),
                        PlanMessageBody::Text(text.clone()),
                    )
                    .await?;
                    broadcast_event(
                        deps,
                        session_id,
                        PlanEvent::StepOutput {
                            plan_id: plan_id.into(),
                            step_id: plan.steps[step_idx].step_id.clone(),
                            timestamp: now,
                            output_text: text,
                        },
                    );
                    break 'step;
                }
                AgentTurnResult::ToolCallRequested { call_id, name, arguments } => {
                    let now = Utc::now();
                    let arguments_digest = digest_json(&arguments);
                    broadcast_event(
                        deps,
                        session_id,
                        PlanEvent::StepToolInvoked {
                            plan_id: plan_id.into(),
                            step_id: plan.steps[step_idx].step_id.clone(),
                            timestamp: now,
                            tool_name: name.clone(),
                            arguments_digest: arguments_digest.clone(),
                        },
                    );

                    let call_started = tokio::time::Instant::now();
                    let invoke_result = deps.mcp.invoke(&name, arguments, &allow_list).await;
                    let ms = call_started.elapsed().as_millis() as u64;

                    let (is_error, result_text) = match &invoke_result {
                        Ok(v) => (false, v.to_string()),
                        Err(e) => (true, e.to_string()),
                    };
                    let result_digest = digest_str(&result_text);

                    plan.steps[step_idx].tool_calls.push(ToolCallRecord {
                        tool_name: name.clone(),
                        arguments_digest: arguments_digest.clone(),
                        result_digest: result_digest.clone(),
                        ms,
                    });
                    persist_plan(deps, &plan).await?;
                    record_message(
                        deps,
                        session_id,
                        plan_id,
                        PlanMessageKind::ToolCall,
                        Some(agent_name.clone()),
                        PlanMessageBody::Structured(serde_json::json!({"tool_name": name.clone(), "arguments_digest": arguments_digest})),
                    )
                    .await?;
                    broadcast_event(
                        deps,
                        session_id,
                        PlanEvent::StepToolReturned {
                            plan_id: plan_id.into(),
                            step_id: plan.steps[step_idx].step_id.clone(),
                            timestamp: Utc::now(),
                            tool_name: name,
                            result_digest: result_digest.clone(),
                            is_error,
                            ms,
                        },
                    );
                    record_message(
                        deps,
                        session_id,
                        plan_id,
                        PlanMessageKind::ToolResult,
                        Some(agent_name.clone()),
                        PlanMessageBody::Structured(serde_json::json!({"result_digest": result_digest, "is_error": is_error})),
                    )
                    .await?;

                    agent.record_tool_result(call_id, agentforge_core::smart_truncate(&result_text, TOOL_RESULT_CAP_CHARS));
                    next_input = None;
                    continue 'step;
                }
                AgentTurnResult::ClarificationRequested(question) => {
                    clarifications_this_step += 1;
                    if clarifications_this_step > MAX_CLARIFICATIONS_PER_STEP {
                        fail_plan(deps, &mut plan, ErrorKind::ClarificationLoop, "clarification requested too many times for one step").await?;
                        break 'plan;
                    }

                    let now = Utc::now();
                    plan.steps[step_idx].status = StepStatus::AwaitingClarification;
                    plan.try_transition(PlanStatus::AwaitingClarification, now).ok();
                    persist_plan(deps, &plan).await?;
                    record_message(
                        deps,
                        session_id,
                        plan_id,
                        PlanMessageKind::ClarificationRequest,
                        Some(agent_name.clone()),
                        PlanMessageBody::Text(question.clone()),
                    )
                    .await?;
                    broadcast_event(
                        deps,
                        session_id,
                        PlanEvent::ClarificationAsked {
                            plan_id: plan_id.into(),
                            step_id: plan.steps[step_idx].step_id.clone(),
                            timestamp: now,
                            question,
                        },
                    );

                    let (tx, mut rx) = oneshot::channel();
                    *deps.control.clarify_tx.lock().await = Some(tx);

                    let reply = loop {
                        tokio::select! {
                            _ = deps.control.wake.notified() => {
                                if deps.control.cancellation_requested.load(Ordering::SeqCst) || deps.control.force_abort_requested.load(Ordering::SeqCst) {
                                    break None;
                                }
                            }
                            res = &mut rx => {
                                break res.ok();
                            }
                        }
                    };
                    *deps.control.clarify_tx.lock().await = None;

                    let Some(reply) = reply else {
                        let now = Utc::now();
                        plan.try_transition(PlanStatus::Cancelled, now).ok();
                        persist_plan(deps, &plan).await?;
                        broadcast_event(deps, session_id, PlanEvent::PlanCancelled { plan_id: plan_id.into(), timestamp: now });
                        break 'plan;
                    };

                    let now = Utc::now();
                    plan.steps[step_idx].status = StepStatus::Running;
                    plan.try_transition(PlanStatus::Running, now).ok();
                    persist_plan(deps, &plan).await?;
                    record_message(
                        deps,
                        session_id,
                        plan_id,
                        PlanMessageKind::ClarificationReply,
                        None,
                        PlanMessageBody::Text(reply.clone()),
                    )
                    .await?;
                    broadcast_event(
                        deps,
                        session_id,
                        PlanEvent::ClarificationAnswered {
                            plan_id: plan_id.into(),
                            step_id: plan.steps[step_idx].step_id.clone(),
                            timestamp: now,
                            reply: reply.clone(),
                        },
                    );
                    next_input = Some(Message::user(reply));
                    continue 'step;
                }
                AgentTurnResult::Failed { kind, message } => {
                    let error_kind = match kind {
                        TurnFailureKind::TurnCapExceeded => ErrorKind::TurnCap,
                        TurnFailureKind::Timeout | TurnFailureKind::LlmFatal => ErrorKind::Agent,
                    };
                    let now = Utc::now();
                    plan.steps[step_idx].status = StepStatus::Failed;
                    plan.steps[step_idx].finished_at = Some(now);
                    plan.steps[step_idx].error_kind = Some(error_kind);
                    persist_plan(deps, &plan).await?;
                    record_message(
                        deps,
                        session_id,
                        plan_id,
                        PlanMessageKind::Error,
                        Some(agent_name.clone()),
                        PlanMessageBody::Text(message.clone()),
                    )
                    .await?;
                    broadcast_event(
                        deps,
                        session_id,
                        PlanEvent::StepFailed {
                            plan_id: plan_id.into(),
                            step_id: plan.steps[step_idx].step_id.clone(),
                            timestamp: now,
                            error_kind,
                            message: message.clone(),
                        },
                    );
                    fail_plan(deps, &mut plan, error_kind, &message).await?;
                    break 'plan;
                }
            }
        }
    }

    Ok(())
}

async fn persist_plan(deps: &RunPlanDeps, plan: &Plan) -> Result<(), agentforge_store::StoreError> {
    typed::put(deps.store.as_ref(), DocumentKind::Plan, &plan.plan_id, &plan.session_id, plan).await
}

/// Appends one entry to a session's transcript. Transcript
/// messages carry digests for tool traffic, never raw arguments/results,
/// matching the no-raw-payload rule already enforced on `ToolCallRecord`.
async fn record_message(
    deps: &RunPlanDeps,
    session_id: &str,
    plan_id: &str,
    kind: PlanMessageKind,
    agent_name: Option<String>,
    body: PlanMessageBody,
) -> Result<(), agentforge_store::StoreError> {
    let msg = PlanMessage::new(session_id, Some(plan_id.to_string()), kind, agent_name, body, Utc::now());
    typed::put(deps.store.as_ref(), DocumentKind::Message, &msg.message_id.to_string(), session_id, &msg).await
}

fn broadcast_event(deps: &RunPlanDeps, session_id: &str, event: PlanEvent) {
    let _ = deps.events_tx.send((session_id.to_string(), StreamEvent::Plan(event)));
}

async fn fail_plan(deps: &RunPlanDeps, plan: &mut Plan, kind: ErrorKind, message: &str) -> Result<(), agentforge_store::StoreError> {
    let now = Utc::now();
    plan.fail_with(kind, now).ok();
    persist_plan(deps, plan).await?;
    info!(plan_id = %plan.plan_id, ?kind, %message, "plan failed");
    broadcast_event(deps, &plan.session_id, PlanEvent::PlanFailed { plan_id: plan.plan_id.clone(), timestamp: now, error_kind: kind });
    Ok(())
}
