// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

/// Seam for an external identity source — auth is optional at this layer.
/// Supplying the bearer token itself (OAuth flows, token refresh, vaults) is
/// out of scope; this trait is where a deployment wires one in.
#[async_trait]
pub trait AuthTokenSource: Send + Sync {
    async fn token(&self) -> anyhow::Result<String>;
}

/// Reads a bearer token once from an environment variable at construction
/// time. Sufficient for the local/dev and CI shapes this workspace targets;
/// a deployment needing rotation supplies its own `AuthTokenSource`.
pub struct EnvTokenSource {
    token: String,
}

impl EnvTokenSource {
    pub fn from_env(var: &str) -> anyhow::Result<Self> {
        let token = std::env::var(var)
            .map_err(|_| anyhow::anyhow!("environment variable {var:?} not set for MCP auth"))?;
        Ok(Self { token })
    }
}

#[async_trait]
impl AuthTokenSource for EnvTokenSource {
    async fn token(&self) -> anyhow::Result<String> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_token_source_reads_once() {
        std::env::set_var("AGENTFORGE_TEST_MCP_TOKEN", "secret-value");
        let source = EnvTokenSource::from_env("AGENTFORGE_TEST_MCP_TOKEN").unwrap();
        assert_eq!(source.token().await.unwrap(), "secret-value");
        std::env::remove_var("AGENTFORGE_TEST_MCP_TOKEN");
    }

    #[tokio::test]
    async fn missing_env_var_errors() {
        std::env::remove_var("AGENTFORGE_TEST_MCP_TOKEN_MISSING");
        let result = EnvTokenSource::from_env("AGENTFORGE_TEST_MCP_TOKEN_MISSING");
        assert!(result.is_err());
    }
}
