// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// A chat-completion backend for agent turns.
///
/// Implementations stream [`ResponseEvent`]s rather than returning a single
/// response, so the agent runtime can surface text and tool-call deltas as
/// they arrive without buffering the whole turn.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for logging.
    fn name(&self) -> &str;

    /// Model identifier as sent to the provider.
    fn model_name(&self) -> &str;

    /// Context window size in tokens, used by the agent runtime to decide
    /// when to compact conversation history.
    fn context_window(&self) -> usize;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
