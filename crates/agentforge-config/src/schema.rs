// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestration core.
///
/// Every field is defaulted so that an environment with no config files at
/// all still boots with sane values (see §6 of the specification).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Tunables for the plan execution loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_plans: usize,
    pub per_step_turn_cap: usize,
    pub agent_turn_timeout_seconds: u64,
    pub plan_deadline_seconds: u64,
    pub cancel_hard_deadline_seconds: u64,
    pub planner_max_steps: usize,
    /// Whether a `Cancelled` plan may be restarted as a new plan that
    /// inherits its prior facts. Defaults to "no".
    pub allow_restart_from_cancelled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_plans: 32,
            per_step_turn_cap: 12,
            agent_turn_timeout_seconds: 120,
            plan_deadline_seconds: 3600,
            cancel_hard_deadline_seconds: 30,
            planner_max_steps: 20,
            allow_restart_from_cancelled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Base URL of the streamable-HTTP MCP tool server.
    pub server_url: String,
    pub tool_call_timeout_seconds: u64,
    pub max_inflight: usize,
    pub auth_enabled: bool,
    /// Environment variable holding the bearer token, when `auth_enabled`.
    pub auth_token_env: Option<String>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:7337/mcp".to_string(),
            tool_call_timeout_seconds: 60,
            max_inflight: 16,
            auth_enabled: false,
            auth_token_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider identifier: "openai" | "anthropic" | "mock" (others pass
    /// through to an OpenAI-compatible endpoint).
    pub provider: String,
    pub name: String,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_output_tokens: u32,
    pub context_window: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            name: "mock-model".to_string(),
            api_key_env: None,
            base_url: None,
            max_output_tokens: 4096,
            context_window: 128_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub token_file: Option<std::path::PathBuf>,
    /// Maximum failed-auth attempts per minute before an IP is locked out.
    pub auth_rate_limit_per_minute: u32,
    pub auth_rate_limit_burst: u32,
    pub event_subscriber_lag_threshold: usize,
    pub heartbeat_interval_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8443".to_string(),
            token_file: None,
            auth_rate_limit_per_minute: 5,
            auth_rate_limit_burst: 2,
            event_subscriber_lag_threshold: 256,
            heartbeat_interval_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Use the in-memory persistence fallback (`--in-memory` CLI flag also
    /// sets this). No other backend is implemented in this core.
    #[serde(rename = "in_memory")]
    pub in_memory: bool,
    pub conflict_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            in_memory: true,
            conflict_retries: 5,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.orchestrator.max_concurrent_plans, 32);
        assert_eq!(cfg.orchestrator.per_step_turn_cap, 12);
        assert_eq!(cfg.mcp.max_inflight, 16);
        assert!(cfg.store.in_memory);
        assert!(!cfg.orchestrator.allow_restart_from_cancelled);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.orchestrator.max_concurrent_plans, cfg.orchestrator.max_concurrent_plans);
        assert_eq!(back.mcp.server_url, cfg.mcp.server_url);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults_for_missing_fields() {
        let yaml = "orchestrator:\n  max_concurrent_plans: 4\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.orchestrator.max_concurrent_plans, 4);
        assert_eq!(cfg.orchestrator.per_step_turn_cap, 12);
        assert_eq!(cfg.mcp.server_url, McpConfig::default().server_url);
    }
}
