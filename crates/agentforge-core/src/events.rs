// SPDX-License-Identifier: Apache-2.0
//! Events produced by one agent turn, plus the closed `AgentTurnResult` an
//! agent's `turn()` call resolves to.

use serde::{Deserialize, Serialize};

/// Incremental signal emitted while a turn is in flight, surfaced by the
/// orchestrator as a gateway `StreamDelta` but never itself persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    TextDelta(String),
    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallFinished { call_id: String, tool_name: String, is_error: bool },
    TurnComplete,
    Error(String),
}

/// The closed outcome of one `Agent::turn` call.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTurnResult {
    Final(String),
    ToolCallRequested { call_id: String, name: String, arguments: serde_json::Value },
    ClarificationRequested(String),
    Failed { kind: TurnFailureKind, message: String },
}

/// The subset of `agentforge_plan::ErrorKind` an agent turn can itself
/// produce before the orchestrator ever sees a tool result: these collapse
/// to `error_kind=Agent` or `TurnCap` at the step level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFailureKind {
    LlmFatal,
    Timeout,
    TurnCapExceeded,
}
