// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A single agent's role within a [`TeamConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub system_prompt: String,
    /// Whether this agent may call tools at all. A planner agent, for
    /// instance, typically has this set to `false`.
    pub can_call_tools: bool,
    /// Restricts which catalogued tool names this agent may invoke. `None`
    /// means the agent sees the full catalogue.
    pub tool_allow_list: Option<Vec<String>>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            can_call_tools: true,
            tool_allow_list: None,
        }
    }

    pub fn without_tools(mut self) -> Self {
        self.can_call_tools = false;
        self
    }

    pub fn allow_only(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tool_allow_list = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Immutable-after-upload descriptor for a team of agents. Referenced by
/// plans; never deleted while a plan references it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamConfig {
    pub team_id: String,
    pub name: String,
    pub agents: Vec<AgentSpec>,
}

impl TeamConfig {
    pub fn resolve(&self, agent_name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == agent_name)
    }

    /// The designated planner: the first agent in the roster. This workspace
    /// does not model a separate "distinguished planner" flag — roster order
    /// is the only signal.
    pub fn planner(&self) -> Option<&AgentSpec> {
        self.agents.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_team() -> TeamConfig {
        TeamConfig {
            team_id: "t1".into(),
            name: "demo".into(),
            agents: vec![
                AgentSpec::new("Planner", "you plan").without_tools(),
                AgentSpec::new("Executor", "you execute").allow_only(["summarize"]),
            ],
        }
    }

    #[test]
    fn resolve_finds_agent_by_name() {
        let team = sample_team();
        assert!(team.resolve("Executor").is_some());
        assert!(team.resolve("Nonexistent").is_none());
    }

    #[test]
    fn planner_is_first_agent() {
        let team = sample_team();
        assert_eq!(team.planner().unwrap().name, "Planner");
    }

    #[test]
    fn allow_only_restricts_tool_list() {
        let team = sample_team();
        let executor = team.resolve("Executor").unwrap();
        assert_eq!(executor.tool_allow_list.as_deref(), Some(&["summarize".to_string()][..]));
    }
}
