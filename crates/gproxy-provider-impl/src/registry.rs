//! Builds the set of Provider Adapters the Router dispatches candidates
//! against, from operator-supplied per-provider credentials (§2 "Provider
//! Adapter" collaborator). Grounded on the teacher's
//! `gproxy-provider-impl/src/registry.rs` `build_registry` shape, trimmed
//! from the teacher's 11 hardcoded OAuth provider variants down to the
//! three documented-API vendors this spec covers.

use std::collections::HashMap;
use std::sync::Arc;

use gproxy_provider_core::Provider;

use crate::claude::ClaudeProvider;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

/// One configured upstream credential: which adapter to build, its base URL
/// override (defaults to the vendor's public API root), and its API key.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: String,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn build(configs: &[ProviderConfig]) -> Self {
        let client = reqwest::Client::builder().build().expect("failed to build reqwest client");
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::with_capacity(configs.len());
        for config in configs {
            let provider: Arc<dyn Provider> = match config.kind {
                ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                    client.clone(),
                    config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                    config.api_key.clone(),
                )),
                ProviderKind::Anthropic => Arc::new(ClaudeProvider::new(
                    client.clone(),
                    config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
                    config.api_key.clone(),
                )),
                ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                    client.clone(),
                    config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
                    config.api_key.clone(),
                )),
            };
            providers.insert(config.provider_id.clone(), provider);
        }
        Self { providers }
    }

    /// Builds a registry directly from already-constructed adapters,
    /// bypassing vendor credential wiring — used to assemble a registry
    /// around a test-only `Provider` (§9 "a mock used in tests") without a
    /// live API key, and anywhere else an adapter is built out-of-band.
    pub fn from_providers(providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_adapter_per_configured_provider() {
        let registry = ProviderRegistry::build(&[
            ProviderConfig {
                provider_id: "openai-primary".to_string(),
                kind: ProviderKind::OpenAi,
                base_url: None,
                api_key: "sk-test".to_string(),
            },
            ProviderConfig {
                provider_id: "anthropic-primary".to_string(),
                kind: ProviderKind::Anthropic,
                base_url: None,
                api_key: "ak-test".to_string(),
            },
        ]);

        assert_eq!(registry.len(), 2);
        assert!(registry.get("openai-primary").is_some());
        assert!(registry.get("missing").is_none());
    }
}
