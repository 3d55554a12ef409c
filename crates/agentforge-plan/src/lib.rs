// SPDX-License-Identifier: Apache-2.0
//! Plan state machine (C4): the closed data model (`Plan`, `Step`,
//! `Message`, `TeamConfig`, `AgentSpec`, `DatasetHandle`) and the domain
//! event log (`PlanEvent`) that the orchestrator mutates and emits.

mod dataset;
mod event;
mod message;
mod plan;
mod session;
mod step;
mod team;

pub use dataset::DatasetHandle;
pub use event::PlanEvent;
pub use message::{Message, MessageBody, MessageKind};
pub use plan::{Plan, PlanStatus, PlanTransitionError};
pub use session::Session;
pub use step::{ErrorKind, Step, StepStatus, ToolCallRecord};
pub use team::{AgentSpec, TeamConfig};
