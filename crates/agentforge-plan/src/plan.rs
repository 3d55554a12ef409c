// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::step::{ErrorKind, Step, StepStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Created,
    AwaitingApproval,
    Running,
    AwaitingClarification,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanTransitionError {
    #[error("plan is already terminal in state {0:?}; no further mutation accepted")]
    AlreadyTerminal(PlanStatus),
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: PlanStatus, to: PlanStatus },
}

/// The canonical plan lifecycle. Created by the orchestrator, mutated only
/// by the orchestrator, persisted after every transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan_id: String,
    pub session_id: String,
    pub team_id: String,
    pub user_request: String,
    pub overall_status: PlanStatus,
    pub steps: Vec<Step>,
    pub facts: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub final_result: Option<String>,
    pub cancellation_requested: bool,
    /// Index into `steps` of the lowest-ordinal non-terminal step, or `None`
    /// once every step is terminal. A single cursor (rather than a set of
    /// "active" steps) is what makes concurrent clarifications structurally
    /// impossible: only one step can ever be the target of a `Clarify`
    /// command at a time.
    pub current_step: Option<usize>,
}

impl Plan {
    pub fn new(
        plan_id: impl Into<String>,
        session_id: impl Into<String>,
        team_id: impl Into<String>,
        user_request: impl Into<String>,
        facts: impl Into<String>,
        steps: Vec<Step>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            session_id: session_id.into(),
            team_id: team_id.into(),
            user_request: user_request.into(),
            overall_status: PlanStatus::Created,
            steps,
            facts: facts.into(),
            created_at: now,
            updated_at: now,
            final_result: None,
            cancellation_requested: false,
            current_step: Some(0),
        }
    }

    /// Ordinals must be contiguous starting at 1.
    pub fn ordinals_are_contiguous(&self) -> bool {
        self.steps
            .iter()
            .enumerate()
            .all(|(i, s)| s.ordinal as usize == i + 1)
    }

    /// Attempts a state transition, enforcing the legal-edge table and an
    /// idempotence contract. Returns `Ok(true)` if the status actually
    /// changed, `Ok(false)` if `to` was already the current status (a no-op,
    /// not an error — this is what lets a repeated `Approve` or `Clarify`
    /// command be silently absorbed by the caller instead of forcing it to
    /// track whether it already sent one).
    pub fn try_transition(&mut self, to: PlanStatus, now: DateTime<Utc>) -> Result<bool, PlanTransitionError> {
        if self.overall_status == to {
            return Ok(false);
        }
        if self.overall_status.is_terminal() {
            return Err(PlanTransitionError::AlreadyTerminal(self.overall_status));
        }
        if !is_legal_edge(self.overall_status, to) {
            return Err(PlanTransitionError::IllegalTransition { from: self.overall_status, to });
        }
        self.overall_status = to;
        self.updated_at = now;
        Ok(true)
    }

    pub fn request_cancellation(&mut self) {
        self.cancellation_requested = true;
    }

    /// The step the orchestrator should act on next, or `None` if every step
    /// is terminal.
    pub fn active_step(&self) -> Option<&Step> {
        self.current_step.and_then(|i| self.steps.get(i))
    }

    pub fn active_step_mut(&mut self) -> Option<&mut Step> {
        self.current_step.and_then(move |i| self.steps.get_mut(i))
    }

    /// Advances `current_step` past the just-finished step, returning the
    /// next non-terminal ordinal index, or `None` if none remain.
    pub fn advance_cursor(&mut self) {
        let next = self.current_step.map(|i| i + 1).unwrap_or(0);
        self.current_step = if next < self.steps.len() { Some(next) } else { None };
    }

    /// `overall_status = Completed ⇒ every step is Done or Skipped`.
    pub fn all_steps_terminal_success(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Done | StepStatus::Skipped))
    }

    pub fn any_step_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    pub fn fail_with(&mut self, _kind: ErrorKind, now: DateTime<Utc>) -> Result<bool, PlanTransitionError> {
        self.try_transition(PlanStatus::Failed, now)
    }
}

fn is_legal_edge(from: PlanStatus, to: PlanStatus) -> bool {
    use PlanStatus::*;
    matches!(
        (from, to),
        (Created, AwaitingApproval)
            | (Created, Cancelled)
            | (AwaitingApproval, Running)
            | (AwaitingApproval, Cancelled)
            | (Running, AwaitingClarification)
            | (AwaitingClarification, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
            | (AwaitingClarification, Cancelled)
            | (AwaitingClarification, Failed)
    )
}
