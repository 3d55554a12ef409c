// SPDX-License-Identifier: Apache-2.0
//! Domain events emitted by the plan state machine: a closed, tagged enum,
//! one variant per transition, carrying enough structured context that a
//! subscriber reconnecting mid-plan can reconstruct what happened without
//! re-reading the whole transcript.
//!
//! ```text
//! Orchestrator                      Gateway                     Client
//!      │  persist transition               │                      │
//!      │─────────────────────────────────►  │                      │
//!      │  broadcast::Sender<PlanEvent>      │                      │
//!      │───────────────────────────────────►│ serialize as JSON    │
//!      │                                    │─────────────────────►│
//! ```
//! Persisted and broadcast in the same order transitions are committed —
//! never reordered or deduplicated downstream of the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::step::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    PlanCreated {
        plan_id: String,
        timestamp: DateTime<Utc>,
        facts: String,
        step_count: usize,
    },
    StepStarted {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        ordinal: u32,
        agent_name: String,
    },
    StepToolInvoked {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        tool_name: String,
        arguments_digest: String,
    },
    StepToolReturned {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        tool_name: String,
        result_digest: String,
        is_error: bool,
        ms: u64,
    },
    StepOutput {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        output_text: String,
    },
    StepFailed {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        error_kind: ErrorKind,
        message: String,
    },
    ClarificationAsked {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        question: String,
    },
    ClarificationAnswered {
        plan_id: String,
        step_id: String,
        timestamp: DateTime<Utc>,
        reply: String,
    },
    PlanCompleted {
        plan_id: String,
        timestamp: DateTime<Utc>,
        final_result: String,
    },
    PlanFailed {
        plan_id: String,
        timestamp: DateTime<Utc>,
        error_kind: ErrorKind,
    },
    PlanCancelled {
        plan_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        plan_id: String,
        step_id: Option<String>,
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl PlanEvent {
    pub fn plan_id(&self) -> &str {
        match self {
            PlanEvent::PlanCreated { plan_id, .. }
            | PlanEvent::StepStarted { plan_id, .. }
            | PlanEvent::StepToolInvoked { plan_id, .. }
            | PlanEvent::StepToolReturned { plan_id, .. }
            | PlanEvent::StepOutput { plan_id, .. }
            | PlanEvent::StepFailed { plan_id, .. }
            | PlanEvent::ClarificationAsked { plan_id, .. }
            | PlanEvent::ClarificationAnswered { plan_id, .. }
            | PlanEvent::PlanCompleted { plan_id, .. }
            | PlanEvent::PlanFailed { plan_id, .. }
            | PlanEvent::PlanCancelled { plan_id, .. }
            | PlanEvent::Error { plan_id, .. } => plan_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_enum_round_trips_through_json() {
        let event = PlanEvent::StepStarted {
            plan_id: "p1".into(),
            step_id: "st1".into(),
            timestamp: Utc::now(),
            ordinal: 1,
            agent_name: "Executor".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_started");
        let back: PlanEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn plan_id_accessor_works_across_variants() {
        let event = PlanEvent::PlanCancelled { plan_id: "p2".into(), timestamp: Utc::now() };
        assert_eq!(event.plan_id(), "p2");
    }
}
