// SPDX-License-Identifier: Apache-2.0
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;

use agentforge_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// `"mock"` selects the deterministic [`MockProvider`]; every other
/// `provider` string is treated as an OpenAI-compatible endpoint, using
/// `base_url` (default `https://api.openai.com/v1`) and the resolved API
/// key from `api_key_env`.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "mock" => Ok(Box::new(MockProvider)),
        _ => {
            let api_key = cfg.api_key_env.as_ref().and_then(|env| std::env::var(env).ok());
            let base_url = cfg.base_url.as_deref().unwrap_or("https://api.openai.com/v1");
            Ok(Box::new(OpenAiCompatProvider::new(
                cfg.name.clone(),
                api_key,
                base_url,
                cfg.max_output_tokens,
                cfg.context_window,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_mock_succeeds() {
        let cfg = ModelConfig { provider: "mock".into(), ..ModelConfig::default() };
        let provider = from_config(&cfg).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn from_config_openai_compat_succeeds() {
        let cfg = ModelConfig { provider: "openai".into(), name: "gpt-4o".into(), ..ModelConfig::default() };
        let provider = from_config(&cfg).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }
}
