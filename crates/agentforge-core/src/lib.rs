// SPDX-License-Identifier: Apache-2.0
//! The agent runtime: per-agent turn loop, conversation window, and
//! context compaction.

mod agent;
mod compact;
mod dataset_context;
mod events;
mod session;

pub use agent::{Agent, CLARIFICATION_TOOL_NAME};
pub use compact::{compact_window, emergency_compact, smart_truncate};
pub use dataset_context::dataset_context_message;
pub use events::{AgentEvent, AgentTurnResult, TurnFailureKind};
pub use session::ContextWindow;
