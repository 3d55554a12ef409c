// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::catalogue::{AllowList, ToolCatalogue};
use crate::error::McpError;

/// The seam C3 (the agent runtime) and C5 (the orchestrator) depend on. Kept
/// trait-object-safe so the orchestrator can hold `Arc<dyn McpClient>` and
/// swap the real [`crate::transport::McpTransport`] for
/// [`crate::fake::FakeMcpClient`] in tests without touching call sites.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Refreshes the discovery cache and returns the new catalogue.
    async fn discover(&self) -> Result<ToolCatalogue, McpError>;

    /// Returns the most recently discovered catalogue without contacting the
    /// server. Empty until `discover()` has run at least once.
    fn catalogue(&self) -> ToolCatalogue;

    /// Invokes `tool_name` with `arguments`, checking `allow` locally first —
    /// no network round-trip on denial.
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        allow: &AllowList,
    ) -> Result<serde_json::Value, McpError>;
}
