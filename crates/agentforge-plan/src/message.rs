// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in a session's append-only conversation transcript. The
/// transcript itself is just the ordered sequence of these for a
/// `session_id`; there is no separate "transcript" type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: Uuid,
    pub session_id: String,
    pub plan_id: Option<String>,
    pub kind: MessageKind,
    pub agent_name: Option<String>,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        session_id: impl Into<String>,
        plan_id: Option<String>,
        kind: MessageKind,
        agent_name: Option<String>,
        body: MessageBody,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            session_id: session_id.into(),
            plan_id,
            kind,
            agent_name,
            body,
            timestamp: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserRequest,
    AgentOutput,
    ToolCall,
    ToolResult,
    ClarificationRequest,
    ClarificationReply,
    ApprovalRequest,
    ApprovalDecision,
    Error,
    FinalResult,
}

/// A message's payload: either free text or a structured value (a tool call
/// or its result). Untagged so plain-text messages serialize as a bare JSON
/// string over the wire — the leanest shape that round-trips
/// (`agentforge_model::MessageContent` follows the same untagged pattern).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Structured(serde_json::Value),
}

impl MessageBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(t) => Some(t),
            MessageBody::Structured(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_text_accessor() {
        let body = MessageBody::Text("hello".into());
        assert_eq!(body.as_text(), Some("hello"));
        let structured = MessageBody::Structured(serde_json::json!({"a": 1}));
        assert_eq!(structured.as_text(), None);
    }
}
