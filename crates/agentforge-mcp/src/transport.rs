// SPDX-License-Identifier: Apache-2.0
//! The real [`McpClient`](crate::client::McpClient) implementation: a single
//! logical connection to a tool server over streamable HTTP, speaking a
//! JSON-RPC-style envelope (`id`/`method`/`params`/`result`/`error`).
//! Retries and concurrency limiting happen here, invisibly to callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use crate::auth::AuthTokenSource;
use crate::catalogue::{AllowList, ToolCatalogue, ToolDescriptor};
use crate::client::McpClient;
use crate::error::McpError;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

pub struct McpTransport {
    server_url: String,
    client: reqwest::Client,
    catalogue: RwLock<ToolCatalogue>,
    inflight: Semaphore,
    next_id: AtomicU64,
    auth: Option<Arc<dyn AuthTokenSource>>,
}

impl McpTransport {
    pub fn new(server_url: impl Into<String>, max_inflight: usize, auth: Option<Arc<dyn AuthTokenSource>>) -> Self {
        Self {
            server_url: server_url.into(),
            client: reqwest::Client::new(),
            catalogue: RwLock::new(ToolCatalogue::default()),
            inflight: Semaphore::new(max_inflight.max(1)),
            next_id: AtomicU64::new(1),
            auth,
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_envelope(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_request_id();
        let body = json!({ "id": id, "method": method, "params": params });

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&body).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < MAX_RETRY_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    let jitter_ms = rand::thread_rng().gen_range(0..50);
                    let delay = backoff + Duration::from_millis(jitter_ms);
                    warn!(%method, attempt, delay_ms = delay.as_millis() as u64, "retrying transient MCP transport error");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, body: &Value) -> Result<Value, McpError> {
        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|e| McpError::TransportFatal(format!("concurrency limiter closed: {e}")))?;

        let mut req = self.client.post(&self.server_url).json(body);
        if let Some(auth) = &self.auth {
            let token = auth
                .token()
                .await
                .map_err(|e| McpError::TransportFatal(format!("auth token source failed: {e}")))?;
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                McpError::TransportTransient(e.to_string())
            } else {
                McpError::TransportFatal(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpError::TransportTransient(format!("{status}: {text}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpError::TransportFatal(format!("{status}: {text}")));
        }

        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| McpError::TransportFatal(format!("malformed JSON-RPC envelope: {e}")))?;

        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown tool server error")
                .to_string();
            return Err(McpError::ToolExecutionError(String::new(), message));
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| McpError::TransportFatal("envelope carries neither result nor error".into()))
    }
}

#[async_trait]
impl McpClient for McpTransport {
    async fn discover(&self) -> Result<ToolCatalogue, McpError> {
        let result = self.send_envelope("tools/list", json!({})).await?;
        let raw_tools = result
            .get("tools")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        let mut tools = Vec::with_capacity(raw_tools.len());
        for t in raw_tools {
            tools.push(ToolDescriptor {
                name: t.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string(),
                description: t.get("description").and_then(|d| d.as_str()).unwrap_or_default().to_string(),
                input_schema: t.get("input_schema").cloned().unwrap_or_else(|| json!({})),
            });
        }

        let mut cache = self.catalogue.write().await;
        let generation = cache.generation + 1;
        *cache = ToolCatalogue::new(generation, tools.clone());
        debug!(tool_count = tools.len(), generation, "refreshed MCP tool catalogue");
        Ok(cache.clone())
    }

    fn catalogue(&self) -> ToolCatalogue {
        // try_read rather than a blocking read: this is a synchronous trait
        // method callable from a non-async context, and discovery holds the
        // write lock only across its own round-trip, never idle.
        self.catalogue
            .try_read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    async fn invoke(
        &self,
        tool_name: &str,
        arguments: Value,
        allow: &AllowList,
    ) -> Result<Value, McpError> {
        if !allow.allows(tool_name) {
            return Err(McpError::ToolDenied(tool_name.to_string()));
        }

        let descriptor = {
            let cache = self.catalogue.read().await;
            cache.get(tool_name).cloned()
        };
        let Some(descriptor) = descriptor else {
            return Err(McpError::ToolNotFound(tool_name.to_string()));
        };

        if let Err(reason) = validate_against_schema(&arguments, &descriptor.input_schema) {
            return Err(McpError::ToolInputInvalid(tool_name.to_string(), reason));
        }

        let result = self
            .send_envelope("tools/call", json!({ "name": tool_name, "arguments": arguments }))
            .await
            .map_err(|e| match e {
                McpError::ToolExecutionError(_, msg) => McpError::ToolExecutionError(tool_name.to_string(), msg),
                other => other,
            })?;
        Ok(result)
    }
}

/// Minimal structural check against a cached JSON Schema: verifies required
/// top-level properties are present. Full JSON Schema validation is out of
/// scope for this transport — this catches the common "forgot a required
/// argument" case before spending a network round-trip.
fn validate_against_schema(arguments: &Value, schema: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let Some(obj) = arguments.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };
    for field in required {
        let Some(name) = field.as_str() else { continue };
        if !obj.contains_key(name) {
            return Err(format!("missing required field {name:?}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_validation_catches_missing_required_field() {
        let schema = json!({ "required": ["path"] });
        let err = validate_against_schema(&json!({}), &schema).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn schema_validation_passes_when_satisfied() {
        let schema = json!({ "required": ["path"] });
        assert!(validate_against_schema(&json!({ "path": "/tmp" }), &schema).is_ok());
    }

    #[test]
    fn no_required_list_means_anything_passes() {
        let schema = json!({});
        assert!(validate_against_schema(&json!({ "whatever": 1 }), &schema).is_ok());
    }
}
