// SPDX-License-Identifier: Apache-2.0
//! Turning an `AgentSpec` (declarative, persisted as part of a `TeamConfig`)
//! into a live `agentforge_core::Agent`, and parsing the planner agent's
//! structured step-plan output.

use std::sync::Arc;
use std::time::Duration;

use agentforge_core::Agent;
use agentforge_mcp::{AllowList, McpClient};
use agentforge_model::ModelProvider;
use agentforge_plan::AgentSpec;
use serde::Deserialize;

use crate::error::OrchestratorError;

/// The tool-call allow-list implied by an `AgentSpec`. Kept
/// as its own function rather than inlined in [`build_agent`] because the
/// orchestrator's own tool-dispatch loop re-derives the same allow-list to
/// pass into `McpClient::invoke` — `Agent` only uses it to filter the
/// schemas it shows the model, not to gate the actual dispatch.
pub fn compute_allow_list(spec: &AgentSpec) -> AllowList {
    if !spec.can_call_tools {
        return AllowList::from_names(std::iter::empty());
    }
    match &spec.tool_allow_list {
        Some(names) => AllowList::from_names(names.clone()),
        None => AllowList::unfiltered(),
    }
}

pub fn build_agent(
    spec: &AgentSpec,
    provider: Arc<dyn ModelProvider>,
    mcp: Arc<dyn McpClient>,
    max_context_tokens: usize,
    turn_cap: u32,
    turn_timeout: Duration,
) -> Agent {
    let allow_list = compute_allow_list(spec);

    Agent::new(
        spec.name.clone(),
        spec.system_prompt.clone(),
        provider,
        mcp,
        allow_list,
        max_context_tokens,
        turn_cap,
        turn_timeout,
    )
}

/// The planner's structured output: `facts` is the short preamble that
/// becomes `Plan.facts` — the agreed-upon grounding every step's
/// agent sees, distinct from the free-form `user_request` — `steps` is the
/// ordered step list: `{"facts": "...", "steps": [{"agent_name": "...", "action": "..."}]}`.
#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    facts: String,
    steps: Vec<PlannerStep>,
}

#[derive(Debug, Deserialize)]
struct PlannerStep {
    agent_name: String,
    action: String,
}

/// Parses the planner's final turn text into its `facts` preamble plus an
/// ordered list of `(agent_name, action)` pairs, validating every referenced
/// agent exists in the team and the step count is within `max_steps`.
pub fn parse_planner_output(
    text: &str,
    team: &agentforge_plan::TeamConfig,
    max_steps: usize,
) -> Result<(String, Vec<(String, String)>), OrchestratorError> {
    let parsed: PlannerOutput = extract_json(text)
        .and_then(|v| serde_json::from_value(v).map_err(|e| e.to_string()))
        .map_err(|e| OrchestratorError::ValidationError(format!("planner output is not valid step JSON: {e}")))?;

    if parsed.steps.is_empty() {
        return Err(OrchestratorError::ValidationError("planner produced zero steps".to_string()));
    }
    if parsed.steps.len() > max_steps {
        return Err(OrchestratorError::ValidationError(format!(
            "planner produced {} steps, exceeding the cap of {max_steps}",
            parsed.steps.len()
        )));
    }

    let mut out = Vec::with_capacity(parsed.steps.len());
    for step in parsed.steps {
        if team.resolve(&step.agent_name).is_none() {
            return Err(OrchestratorError::ValidationError(format!(
                "planner referenced unknown agent {:?}",
                step.agent_name
            )));
        }
        out.push((step.agent_name, step.action));
    }
    Ok((parsed.facts, out))
}

/// The planner may wrap its JSON in prose or a fenced code block; pull the
/// first top-level JSON object out of the text before parsing.
fn extract_json(text: &str) -> Result<serde_json::Value, String> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(v);
    }
    let start = trimmed.find('{').ok_or_else(|| "no JSON object found in planner output".to_string())?;
    let end = trimmed.rfind('}').ok_or_else(|| "no JSON object found in planner output".to_string())?;
    if end < start {
        return Err("malformed JSON object in planner output".to_string());
    }
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentforge_plan::TeamConfig;

    fn team() -> TeamConfig {
        TeamConfig {
            team_id: "team1".into(),
            name: "Analysis Team".into(),
            agents: vec![
                AgentSpec::new("Planner", "you plan").without_tools(),
                AgentSpec::new("Executor", "you execute"),
            ],
        }
    }

    #[test]
    fn parses_clean_json() {
        let text = r#"{"facts":"the dataset has 3 columns","steps":[{"agent_name":"Executor","action":"summarize the dataset"}]}"#;
        let (facts, steps) = parse_planner_output(text, &team(), 20).unwrap();
        assert_eq!(facts, "the dataset has 3 columns");
        assert_eq!(steps, vec![("Executor".to_string(), "summarize the dataset".to_string())]);
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = "Here is my plan:\n```json\n{\"steps\":[{\"agent_name\":\"Executor\",\"action\":\"go\"}]}\n```\nDone.";
        let (_facts, steps) = parse_planner_output(text, &team(), 20).unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn missing_facts_field_defaults_to_empty_string() {
        let text = r#"{"steps":[{"agent_name":"Executor","action":"go"}]}"#;
        let (facts, _steps) = parse_planner_output(text, &team(), 20).unwrap();
        assert_eq!(facts, "");
    }

    #[test]
    fn rejects_unknown_agent() {
        let text = r#"{"steps":[{"agent_name":"Ghost","action":"go"}]}"#;
        let err = parse_planner_output(text, &team(), 20).unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationError(_)));
    }

    #[test]
    fn rejects_zero_steps() {
        let text = r#"{"steps":[]}"#;
        assert!(parse_planner_output(text, &team(), 20).is_err());
    }

    #[test]
    fn rejects_too_many_steps() {
        let steps: Vec<_> = (0..5).map(|i| format!(r#"{{"agent_name":"Executor","action":"step {i}"}}"#)).collect();
        let text = format!(r#"{{"steps":[{}]}}"#, steps.join(","));
        assert!(parse_planner_output(&text, &team(), 3).is_err());
    }
}
