// SPDX-License-Identifier: Apache-2.0
//! Injects known dataset handles into an agent's context on its first turn
//! within a plan, so tools can be called by `dataset_id` without the user
//! repeating themselves.

use agentforge_model::{Message, MessageContent, Role};
use agentforge_plan::DatasetHandle;

/// Builds the single `Context` message listing every dataset handle known
/// to the session, or `None` if there are none to inject.
pub fn dataset_context_message(handles: &[DatasetHandle]) -> Option<Message> {
    if handles.is_empty() {
        return None;
    }
    let mut lines = vec!["Datasets available in this session:".to_string()];
    for h in handles {
        lines.push(format!(
            "- dataset_id={} filename={:?} content_type={} byte_size={}",
            h.dataset_id, h.filename, h.content_type, h.byte_size
        ));
    }
    Some(Message { role: Role::System, content: MessageContent::Text(lines.join("\n")) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_handles_produce_no_message() {
        assert!(dataset_context_message(&[]).is_none());
    }

    #[test]
    fn handles_are_listed_by_dataset_id() {
        let handle = DatasetHandle::new("sales.csv", "user-1", 2048, "text/csv", "blob://x", Utc::now());
        let message = dataset_context_message(std::slice::from_ref(&handle)).unwrap();
        let MessageContent::Text(text) = message.content else { panic!("expected text") };
        assert!(text.contains(&handle.dataset_id.to_string()));
        assert!(text.contains("sales.csv"));
    }
}
