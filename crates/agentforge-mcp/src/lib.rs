// SPDX-License-Identifier: Apache-2.0
//! MCP transport (C2): discovery cache, invocation, retry/backoff,
//! concurrency cap, failure classification — plus an in-memory double for
//! tests.

mod auth;
mod catalogue;
mod client;
mod error;
pub mod fake;
mod transport;

pub use auth::{AuthTokenSource, EnvTokenSource};
pub use catalogue::{AllowList, ToolCatalogue, ToolDescriptor};
pub use client::McpClient;
pub use error::McpError;
pub use fake::FakeMcpClient;
pub use transport::McpTransport;
