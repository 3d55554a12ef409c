// SPDX-License-Identifier: Apache-2.0
//! The wire vocabulary carried by the event stream: every domain
//! [`PlanEvent`] plus the two transport-only kinds the plan state machine
//! itself never produces — `StreamDelta` (partial agent text, never
//! persisted) and `Heartbeat` (sent periodically to keep idle connections
//! alive). `#[serde(untagged)]` lets each variant carry its own `type`
//! discriminator rather than introducing a second tag field that would
//! shadow `PlanEvent`'s.

use agentforge_plan::PlanEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Plan(PlanEvent),
    StreamDelta(StreamDeltaPayload),
    Heartbeat(HeartbeatPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamDeltaPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub plan_id: String,
    pub step_id: String,
    pub delta: String,
    pub timestamp: DateTime<Utc>,
}

impl StreamDeltaPayload {
    pub fn new(plan_id: impl Into<String>, step_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            kind: "stream_delta",
            plan_id: plan_id.into(),
            step_id: step_id.into(),
            delta: delta.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl HeartbeatPayload {
    pub fn new() -> Self {
        Self { kind: "heartbeat", timestamp: Utc::now() }
    }
}

impl Default for HeartbeatPayload {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_delta_serializes_with_own_type_tag() {
        let ev = StreamEvent::StreamDelta(StreamDeltaPayload::new("p1", "st1", "partial"));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "stream_delta");
        assert_eq!(json["delta"], "partial");
    }

    #[test]
    fn plan_event_retains_its_own_tag_through_the_wrapper() {
        let ev = StreamEvent::Plan(PlanEvent::PlanCancelled { plan_id: "p1".into(), timestamp: Utc::now() });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "plan_cancelled");
    }

    #[test]
    fn heartbeat_serializes_with_own_type_tag() {
        let ev = StreamEvent::Heartbeat(HeartbeatPayload::new());
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "heartbeat");
    }
}
