// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failure taxonomy for the MCP transport.
#[derive(Debug, Error, Clone)]
pub enum McpError {
    #[error("tool {0:?} is not in the discovered catalogue")]
    ToolNotFound(String),

    #[error("tool {0:?} arguments rejected against its input schema: {1}")]
    ToolInputInvalid(String, String),

    #[error("tool {0:?} execution failed: {1}")]
    ToolExecutionError(String, String),

    #[error("tool {0:?} is not in the caller's allow-list")]
    ToolDenied(String),

    #[error("transport error (transient, retry policy applies): {0}")]
    TransportTransient(String),

    #[error("transport error (fatal, connection recycled): {0}")]
    TransportFatal(String),
}

impl McpError {
    /// Whether this failure should be retried by [`crate::transport::McpTransport`]'s
    /// internal backoff loop. Only `TransportTransient` is retried; every other
    /// variant is a caller-visible decision point.
    pub fn is_retryable(&self) -> bool {
        matches!(self, McpError::TransportTransient(_))
    }
}
