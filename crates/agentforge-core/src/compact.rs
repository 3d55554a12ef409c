// SPDX-License-Identifier: Apache-2.0
//! Context-window rewriting: when a step's conversation exceeds its token
//! budget, keep the system prompt, the user request, the most recent
//! clarification pair, and the last K tool results; summarize everything
//! else into one `Context` message.

use agentforge_model::{Message, MessageContent, Role};

/// Rewrites `messages` per the retention rule above. `system_prompt`
/// and `user_request` are always kept first; `clarification_pair` (the most
/// recent `ClarificationRequested`/reply round-trip, if any) is kept next;
/// then the last `keep_last_tool_results` tool-result messages verbatim;
/// everything older is folded into a single summarizing `Context` entry so
/// the window shrinks without losing the fact that earlier work happened.
pub fn compact_window(
    messages: &[Message],
    system_prompt: &Message,
    user_request: &Message,
    clarification_pair: Option<(&Message, &Message)>,
    keep_last_tool_results: usize,
) -> Vec<Message> {
    let tool_results: Vec<&Message> = messages
        .iter()
        .filter(|m| matches!(m.content, MessageContent::ToolResult { .. }))
        .collect();
    let kept_tail: Vec<Message> = tool_results
        .iter()
        .rev()
        .take(keep_last_tool_results)
        .rev()
        .map(|m| (*m).clone())
        .collect();

    let summarized_count = messages.len().saturating_sub(kept_tail.len());
    let mut out = vec![system_prompt.clone(), user_request.clone()];
    if let Some((question, reply)) = clarification_pair {
        out.push(question.clone());
        out.push(reply.clone());
    }
    if summarized_count > 0 {
        out.push(Message {
            role: Role::System,
            content: MessageContent::Text(format!(
                "[Context] {summarized_count} earlier turn(s) summarized to stay within the token budget."
            )),
        });
    }
    out.extend(kept_tail);
    out
}

/// Drops everything except the system prompt and the most recent `keep_n`
/// messages — the fallback used when `compact_window`'s structured retention
/// still leaves the window over budget.
pub fn emergency_compact(messages: &[Message], system_prompt: &Message, keep_n: usize) -> Vec<Message> {
    let mut out = vec![system_prompt.clone()];
    let tail_start = messages.len().saturating_sub(keep_n);
    out.extend(messages[tail_start..].iter().cloned());
    out
}

/// Truncates `content` to `cap_chars`, keeping a head and tail slice and
/// marking the elision — used for oversized tool outputs before they enter
/// the window at all.
pub fn smart_truncate(content: &str, cap_chars: usize) -> String {
    if content.chars().count() <= cap_chars {
        return content.to_string();
    }
    let half = cap_chars / 2;
    let chars: Vec<char> = content.chars().collect();
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{head}\n... [truncated {} chars] ...\n{tail}", chars.len() - cap_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(role: Role, text: &str) -> Message {
        Message { role, content: MessageContent::Text(text.to_string()) }
    }

    fn tool_result(id: &str, content: &str) -> Message {
        Message {
            role: Role::Tool,
            content: MessageContent::ToolResult { tool_call_id: id.to_string(), content: content.to_string() },
        }
    }

    #[test]
    fn smart_truncate_passes_short_content_through() {
        assert_eq!(smart_truncate("short", 100), "short");
    }

    #[test]
    fn smart_truncate_keeps_head_and_tail() {
        let content = "a".repeat(50) + &"b".repeat(50);
        let truncated = smart_truncate(&content, 20);
        assert!(truncated.starts_with("aaaaaaaaaa"));
        assert!(truncated.ends_with("bbbbbbbbbb"));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn compact_window_keeps_system_and_user_and_tail_tool_results() {
        let system = text(Role::System, "system prompt");
        let user = text(Role::User, "do the thing");
        let messages = vec![
            text(Role::Assistant, "thinking"),
            tool_result("c1", "result 1"),
            tool_result("c2", "result 2"),
            tool_result("c3", "result 3"),
        ];
        let compacted = compact_window(&messages, &system, &user, None, 2);
        assert_eq!(compacted[0], system);
        assert_eq!(compacted[1], user);
        let tool_count = compacted
            .iter()
            .filter(|m| matches!(m.content, MessageContent::ToolResult { .. }))
            .count();
        assert_eq!(tool_count, 2);
    }

    #[test]
    fn compact_window_includes_clarification_pair_when_present() {
        let system = text(Role::System, "system prompt");
        let user = text(Role::User, "do the thing");
        let question = text(Role::Assistant, "which column?");
        let reply = text(Role::User, "Revenue");
        let compacted = compact_window(&[], &system, &user, Some((&question, &reply)), 1);
        assert!(compacted.contains(&question));
        assert!(compacted.contains(&reply));
    }

    #[test]
    fn emergency_compact_keeps_only_tail() {
        let system = text(Role::System, "system prompt");
        let messages: Vec<Message> = (0..10).map(|i| text(Role::User, &format!("msg {i}"))).collect();
        let compacted = emergency_compact(&messages, &system, 2);
        assert_eq!(compacted.len(), 3);
        assert_eq!(compacted[0], system);
    }
}
