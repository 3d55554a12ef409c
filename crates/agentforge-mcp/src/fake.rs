// SPDX-License-Identifier: Apache-2.0
//! An in-memory [`McpClient`] double, the MCP-transport analogue of
//! `agentforge_model::ScriptedMockProvider`. Public (not `#[cfg(test)]`-gated)
//! so downstream crates — the orchestrator's integration tests in
//! particular — can depend on it as a dev-dependency without re-implementing
//! a fake transport of their own.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalogue::{AllowList, ToolCatalogue, ToolDescriptor};
use crate::client::McpClient;
use crate::error::McpError;

type ToolHandler = Box<dyn Fn(&Value) -> Result<Value, McpError> + Send + Sync>;

/// A fixed catalogue plus one handler per tool name. Calls are recorded for
/// assertions. `discover()` always returns the catalogue this was
/// constructed with — there is no simulated reconnect/refresh behavior since
/// nothing in this workspace exercises it.
pub struct FakeMcpClient {
    catalogue: ToolCatalogue,
    handlers: HashMap<String, ToolHandler>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeMcpClient {
    pub fn new() -> Self {
        Self {
            catalogue: ToolCatalogue::default(),
            handlers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Registers a tool in the catalogue with a handler returning a fixed
    /// result on every call.
    pub fn with_tool(mut self, name: &str, description: &str, input_schema: Value, result: Value) -> Self {
        self.register(name, description, input_schema, move |_| Ok(result.clone()));
        self
    }

    /// Registers a tool whose handler is an arbitrary closure — use for
    /// tests that need per-call-count or argument-dependent behavior.
    pub fn with_tool_fn(
        mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: impl Fn(&Value) -> Result<Value, McpError> + Send + Sync + 'static,
    ) -> Self {
        self.register(name, description, input_schema, handler);
        self
    }

    fn register(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: impl Fn(&Value) -> Result<Value, McpError> + Send + Sync + 'static,
    ) {
        let mut tools: Vec<ToolDescriptor> = self.catalogue.tools().to_vec();
        tools.push(ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        });
        self.catalogue = ToolCatalogue::new(self.catalogue.generation, tools);
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    /// The `(tool_name, arguments)` pairs passed to `invoke()` so far, in
    /// call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for FakeMcpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl McpClient for FakeMcpClient {
    async fn discover(&self) -> Result<ToolCatalogue, McpError> {
        Ok(self.catalogue.clone())
    }

    fn catalogue(&self) -> ToolCatalogue {
        self.catalogue.clone()
    }

    async fn invoke(&self, tool_name: &str, arguments: Value, allow: &AllowList) -> Result<Value, McpError> {
        if !allow.allows(tool_name) {
            return Err(McpError::ToolDenied(tool_name.to_string()));
        }
        let Some(handler) = self.handlers.get(tool_name) else {
            return Err(McpError::ToolNotFound(tool_name.to_string()));
        };
        self.calls.lock().unwrap().push((tool_name.to_string(), arguments.clone()));
        handler(&arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn invoke_returns_registered_result() {
        let fake = FakeMcpClient::new().with_tool("echo", "echoes input", json!({}), json!({"ok": true}));
        let result = fake.invoke("echo", json!({}), &AllowList::unfiltered()).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn invoke_unregistered_tool_is_not_found() {
        let fake = FakeMcpClient::new();
        let err = fake.invoke("missing", json!({}), &AllowList::unfiltered()).await.unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn invoke_denied_tool_skips_handler() {
        let fake = FakeMcpClient::new().with_tool("echo", "", json!({}), json!({}));
        let allow = AllowList::from_names(["other".to_string()]);
        let err = fake.invoke("echo", json!({}), &allow).await.unwrap_err();
        assert!(matches!(err, McpError::ToolDenied(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let fake = FakeMcpClient::new().with_tool("echo", "", json!({}), json!({}));
        fake.invoke("echo", json!({"n": 1}), &AllowList::unfiltered()).await.unwrap();
        fake.invoke("echo", json!({"n": 2}), &AllowList::unfiltered()).await.unwrap();
        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, json!({"n": 1}));
        assert_eq!(calls[1].1, json!({"n": 2}));
    }
}
