use std::collections::HashMap;

use gproxy_provider_core::candidate::Candidate;
use gproxy_provider_core::shape::ApiShape;

/// Which `apiShape`s a given provider declares support for (§4.4 step 4).
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    pub provider_id: String,
    pub supported_shapes: Vec<ApiShape>,
}

impl ProviderCapabilities {
    pub fn supports(&self, shape: ApiShape) -> bool {
        self.supported_shapes.contains(&shape)
    }
}

/// Mapping from caller-facing alias to the set of Candidates it resolves
/// to (§3 GLOSSARY, §4.4 step 2). Hot-reloadable by replacing the whole
/// table; callers hold an `Arc<AliasTable>` snapshot for the duration of a
/// single `resolve()` call so concurrent admin updates never tear a route
/// resolution in half.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, Vec<Candidate>>,
    capabilities: HashMap<String, ProviderCapabilities>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_alias(&mut self, alias: impl Into<String>, candidates: Vec<Candidate>) {
        self.aliases.insert(alias.into(), candidates);
    }

    pub fn insert_capabilities(&mut self, capabilities: ProviderCapabilities) {
        self.capabilities
            .insert(capabilities.provider_id.clone(), capabilities);
    }

    pub fn candidates_for(&self, alias: &str) -> Option<&[Candidate]> {
        self.aliases.get(alias).map(|v| v.as_slice())
    }

    pub fn supports(&self, provider_id: &str, shape: ApiShape) -> bool {
        self.capabilities
            .get(provider_id)
            .is_some_and(|caps| caps.supports(shape))
    }

    /// Every alias currently routable, for `/v1/models` (§6).
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }
}
