// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The flat failure-kind taxonomy a step or plan carries once a component's
/// richer error has crossed into the orchestrator's custody — kinds, not
/// types, matched directly rather than recovered by substring-matching a
/// message; callers must already know the kind before they ask.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Persistence,
    ToolPolicy,
    Tool,
    Agent,
    TurnCap,
    /// A clarification question recurred for the same step more than twice.
    ClarificationLoop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    AwaitingClarification,
    Done,
    Skipped,
    Failed,
}

/// A record of one tool invocation within a step. Arguments/results are
/// stored as digests, not raw payloads — the full payloads live only
/// transiently in the agent's context window; persisting a digest keeps the
/// step log cheap to replay on resumption while still proving a given call
/// happened with given inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments_digest: String,
    pub result_digest: String,
    pub ms: u64,
}

/// One unit of plan execution, bound to a single `AgentSpec`.
/// `Pending → Running → (AwaitingClarification → Running)* → Done|Skipped|Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub step_id: String,
    pub ordinal: u32,
    pub agent_name: String,
    pub action: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub output_text: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl Step {
    pub fn new(step_id: impl Into<String>, ordinal: u32, agent_name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            ordinal,
            agent_name: agent_name.into(),
            action: action.into(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            tool_calls: Vec::new(),
            output_text: None,
            error_kind: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StepStatus::Done | StepStatus::Skipped | StepStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_step_starts_pending() {
        let step = Step::new("st1", 1, "Executor", "do a thing");
        assert_eq!(step.status, StepStatus::Pending);
        assert!(!step.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        let mut step = Step::new("st1", 1, "Executor", "do a thing");
        step.status = StepStatus::Done;
        assert!(step.is_terminal());
        step.status = StepStatus::AwaitingClarification;
        assert!(!step.is_terminal());
    }
}
