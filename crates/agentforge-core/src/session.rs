// SPDX-License-Identifier: Apache-2.0
//! A token-budgeted conversation window scoped to one agent's turn loop
//! within one plan step.

use agentforge_model::Message;

/// The running message window for one `Agent` across a step's turns:
/// conversation history scoped to the plan, trimmed by token budget.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    pub messages: Vec<Message>,
    pub token_count: usize,
    pub max_tokens: usize,
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self { messages: Vec::new(), token_count: 0, max_tokens }
    }

    pub fn push(&mut self, message: Message) {
        self.token_count += message.approx_tokens();
        self.messages.push(message);
    }

    pub fn push_many(&mut self, messages: impl IntoIterator<Item = Message>) {
        for m in messages {
            self.push(m);
        }
    }

    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(Message::approx_tokens).sum();
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    pub fn context_fraction(&self) -> f64 {
        if self.max_tokens == 0 {
            return 1.0;
        }
        self.token_count as f64 / self.max_tokens as f64
    }

    /// Whether the window is within `threshold` (a fraction, e.g. `0.85`) of
    /// its budget — the signal that triggers compaction.
    pub fn is_near_limit(&self, threshold: f64) -> bool {
        self.context_fraction() >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentforge_model::{MessageContent, Role};

    fn text_message(role: Role, text: &str) -> Message {
        Message { role, content: MessageContent::Text(text.to_string()) }
    }

    #[test]
    fn push_accumulates_token_count() {
        let mut window = ContextWindow::new(1000);
        window.push(text_message(Role::User, "hello there"));
        assert!(window.token_count > 0);
        assert_eq!(window.messages.len(), 1);
    }

    #[test]
    fn recalculate_matches_fresh_sum() {
        let mut window = ContextWindow::new(1000);
        window.push_many(vec![
            text_message(Role::User, "one"),
            text_message(Role::Assistant, "two"),
        ]);
        let before = window.token_count;
        window.recalculate_tokens();
        assert_eq!(window.token_count, before);
    }

    #[test]
    fn is_near_limit_respects_threshold() {
        let mut window = ContextWindow::new(10);
        window.push(text_message(Role::User, "x".repeat(100).as_str()));
        assert!(window.is_near_limit(0.5));
    }

    #[test]
    fn replace_messages_recomputes_token_count() {
        let mut window = ContextWindow::new(1000);
        window.push(text_message(Role::User, "first"));
        window.replace_messages(vec![text_message(Role::User, "second message here")]);
        assert_eq!(window.messages.len(), 1);
        assert!(window.token_count > 0);
    }
}
