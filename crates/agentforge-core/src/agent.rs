// SPDX-License-Identifier: Apache-2.0
//! The per-`(AgentSpec, plan)` turn loop: a single-request/response `turn`
//! primitive, with the orchestrator (not the agent itself) driving the
//! tool-use loop across turns.

use std::sync::Arc;
use std::time::Duration;

use agentforge_mcp::{AllowList, McpClient};
use agentforge_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, ToolSchema};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::compact::{compact_window, emergency_compact};
use crate::events::{AgentEvent, AgentTurnResult, TurnFailureKind};
use crate::session::ContextWindow;

/// The reserved tool name an agent calls to request user clarification
/// instead of invoking a real MCP tool. Never forwarded to the MCP
/// transport: the orchestrator intercepts it before dispatch.
pub const CLARIFICATION_TOOL_NAME: &str = "request_clarification";

/// Fraction of `max_context_tokens` at which structured compaction kicks in.
const COMPACT_THRESHOLD: f64 = 0.85;
/// How many of the most recent tool-result messages survive compaction
/// verbatim.
const KEEP_LAST_TOOL_RESULTS: usize = 4;
/// Messages kept (beyond the system prompt) by the emergency fallback when
/// structured compaction alone doesn't bring the window back under budget.
const EMERGENCY_KEEP_MESSAGES: usize = 6;

pub struct Agent {
    pub agent_name: String,
    system_prompt: Message,
    provider: Arc<dyn ModelProvider>,
    mcp: Arc<dyn McpClient>,
    allow_list: AllowList,
    pub window: ContextWindow,
    turn_count: u32,
    turn_cap: u32,
    turn_timeout: Duration,
    dataset_context_injected: bool,
    user_request: Option<Message>,
    pending_clarification_question: Option<Message>,
    clarification_pair: Option<(Message, Message)>,
}

impl Agent {
    pub fn new(
        agent_name: impl Into<String>,
        system_prompt: impl Into<String>,
        provider: Arc<dyn ModelProvider>,
        mcp: Arc<dyn McpClient>,
        allow_list: AllowList,
        max_context_tokens: usize,
        turn_cap: u32,
        turn_timeout: Duration,
    ) -> Self {
        let system_prompt = Message::system(system_prompt.into());
        let mut window = ContextWindow::new(max_context_tokens);
        window.push(system_prompt.clone());
        Self {
            agent_name: agent_name.into(),
            system_prompt,
            provider,
            mcp,
            allow_list,
            window,
            turn_count: 0,
            turn_cap,
            turn_timeout,
            dataset_context_injected: false,
            user_request: None,
            pending_clarification_question: None,
            clarification_pair: None,
        }
    }

    /// Injects dataset handles into the context exactly once, at the start
    /// of the agent's first turn within a plan.
    pub fn inject_dataset_context(&mut self, message: Option<Message>) {
        if self.dataset_context_injected {
            return;
        }
        self.dataset_context_injected = true;
        if let Some(m) = message {
            self.window.push(m);
        }
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        let catalogue = self.mcp.catalogue();
        catalogue
            .tools()
            .iter()
            .filter(|t| self.allow_list.allows(&t.name))
            .map(|t| ToolSchema {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect()
    }

    /// Appends `input` (if any) to the window and performs one request/
    /// response round-trip against the model provider. `events` receives
    /// incremental `AgentEvent::TextDelta`/tool-call notices for the
    /// orchestrator to re-emit as `StreamDelta` — pass `None` when no
    /// streaming consumer is attached (e.g. in tests).
    pub async fn turn(
        &mut self,
        input: Option<Message>,
        events: Option<&UnboundedSender<AgentEvent>>,
    ) -> AgentTurnResult {
        self.turn_count += 1;
        if self.turn_count > self.turn_cap {
            return AgentTurnResult::Failed {
                kind: TurnFailureKind::TurnCapExceeded,
                message: format!("exceeded per-step turn cap of {}", self.turn_cap),
            };
        }

        if let Some(message) = input {
            if self.user_request.is_none() {
                self.user_request = Some(message.clone());
            } else if let Some(question) = self.pending_clarification_question.take() {
                self.clarification_pair = Some((question, message.clone()));
            }
            self.window.push(message);
        }

        self.compact_if_near_limit();

        let request = CompletionRequest {
            messages: self.window.messages.clone(),
            tools: self.tool_schemas(),
            stream: true,
        };

        let stream_result = tokio::time::timeout(self.turn_timeout, self.provider.complete(request)).await;
        let mut stream = match stream_result {
            Err(_) => {
                return AgentTurnResult::Failed {
                    kind: TurnFailureKind::Timeout,
                    message: format!("model provider call exceeded {:?}", self.turn_timeout),
                }
            }
            Ok(Err(e)) => {
                return AgentTurnResult::Failed { kind: TurnFailureKind::LlmFatal, message: e.to_string() }
            }
            Ok(Ok(s)) => s,
        };

        let mut text = String::new();
        let mut tool_call: Option<(String, String, String)> = None; // (id, name, arguments)

        while let Some(event) = stream.next().await {
            match event {
                Ok(ResponseEvent::TextDelta(delta)) => {
                    if !delta.is_empty() {
                        text.push_str(&delta);
                        emit(events, AgentEvent::TextDelta(delta));
                    }
                }
                Ok(ResponseEvent::ToolCall { id, name, arguments }) => {
                    tool_call = Some((id, name, arguments));
                }
                Ok(ResponseEvent::Usage { .. }) => {}
                Ok(ResponseEvent::Done) => break,
                Ok(ResponseEvent::Error(message)) => {
                    return AgentTurnResult::Failed { kind: TurnFailureKind::LlmFatal, message }
                }
                Err(e) => {
                    warn!(agent = %self.agent_name, error = %e, "model stream error");
                    return AgentTurnResult::Failed { kind: TurnFailureKind::LlmFatal, message: e.to_string() };
                }
            }
        }

        if let Some((id, name, arguments_raw)) = tool_call {
            let call_id = if id.is_empty() { Uuid::new_v4().to_string() } else { id };
            self.window.push(Message::tool_call(call_id.clone(), name.clone(), arguments_raw.clone()));
            emit(events, AgentEvent::ToolCallStarted { call_id: call_id.clone(), tool_name: name.clone() });

            let arguments: serde_json::Value = serde_json::from_str(&arguments_raw).unwrap_or(serde_json::Value::Null);

            if name == CLARIFICATION_TOOL_NAME {
                let question = arguments
                    .get("question")
                    .and_then(|q| q.as_str())
                    .unwrap_or("I need more information to proceed.")
                    .to_string();
                self.pending_clarification_question = self.window.messages.last().cloned();
                return AgentTurnResult::ClarificationRequested(question);
            }

            return AgentTurnResult::ToolCallRequested { call_id, name, arguments };
        }

        emit(events, AgentEvent::TurnComplete);
        AgentTurnResult::Final(text)
    }

    /// Appends a tool's result to the window before the next `turn()` call —
    /// used both by normal execution (after an MCP round-trip) and by
    /// resumption, where the result is replayed from a persisted
    /// `tool_calls` log instead of re-invoked.
    pub fn record_tool_result(&mut self, call_id: impl Into<String>, content: impl Into<String>) {
        self.window.push(Message::tool_result(call_id, content));
    }

    /// Rewrites the window once it nears its token budget. Structured
    /// retention runs first; if the window is still over budget
    /// afterwards (e.g. a single enormous tool result), the emergency
    /// tail-only fallback takes over.
    fn compact_if_near_limit(&mut self) {
        if !self.window.is_near_limit(COMPACT_THRESHOLD) {
            return;
        }
        let Some(user_request) = self.user_request.clone() else {
            return;
        };
        let pair = self.clarification_pair.as_ref().map(|(q, r)| (q, r));
        let compacted = compact_window(&self.window.messages, &self.system_prompt, &user_request, pair, KEEP_LAST_TOOL_RESULTS);
        self.window.replace_messages(compacted);

        if self.window.is_near_limit(1.0) {
            let emergency = emergency_compact(&self.window.messages, &self.system_prompt, EMERGENCY_KEEP_MESSAGES);
            self.window.replace_messages(emergency);
        }
    }
}

fn emit(events: Option<&UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentforge_mcp::FakeMcpClient;
    use agentforge_model::ScriptedMockProvider;

    fn agent_with(provider: ScriptedMockProvider) -> Agent {
        Agent::new(
            "Executor",
            "you are a helpful executor",
            Arc::new(provider),
            Arc::new(FakeMcpClient::new()),
            AllowList::unfiltered(),
            4096,
            12,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn turn_returns_final_text_when_no_tool_call() {
        let mut agent = agent_with(ScriptedMockProvider::always_text("all done"));
        let result = agent.turn(Some(Message::user("do the thing")), None).await;
        assert_eq!(result, AgentTurnResult::Final("all done".to_string()));
    }

    #[tokio::test]
    async fn turn_cap_is_enforced() {
        let mut agent = agent_with(ScriptedMockProvider::always_text("still going"));
        agent.turn_cap = 1;
        let _ = agent.turn(Some(Message::user("go")), None).await;
        let second = agent.turn(None, None).await;
        assert!(matches!(
            second,
            AgentTurnResult::Failed { kind: TurnFailureKind::TurnCapExceeded, .. }
        ));
    }

    #[tokio::test]
    async fn clarification_tool_call_surfaces_as_clarification_requested() {
        let provider = ScriptedMockProvider::tool_then_text(
            "call-1",
            CLARIFICATION_TOOL_NAME,
            r#"{"question":"which column?"}"#,
            "unused",
        );
        let mut agent = agent_with(provider);
        let result = agent.turn(Some(Message::user("summarize")), None).await;
        assert_eq!(result, AgentTurnResult::ClarificationRequested("which column?".to_string()));
    }

    #[tokio::test]
    async fn ordinary_tool_call_surfaces_as_tool_call_requested() {
        let provider = ScriptedMockProvider::tool_then_text("call-1", "summarize", r#"{"dataset_id":"d1"}"#, "unused");
        let mut agent = agent_with(provider);
        let result = agent.turn(Some(Message::user("summarize D1")), None).await;
        match result {
            AgentTurnResult::ToolCallRequested { call_id, name, arguments } => {
                assert_eq!(call_id, "call-1");
                assert_eq!(name, "summarize");
                assert_eq!(arguments["dataset_id"], "d1");
            }
            other => panic!("expected ToolCallRequested, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dataset_context_is_injected_only_once() {
        let mut agent = agent_with(ScriptedMockProvider::always_text("ok"));
        let before = agent.window.messages.len();
        agent.inject_dataset_context(Some(Message::system("dataset info")));
        agent.inject_dataset_context(Some(Message::system("dataset info again")));
        assert_eq!(agent.window.messages.len(), before + 1);
    }
}
