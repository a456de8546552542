//! Secret Store (§6: `SecretStore.fetch(ref) → bytes`). Grounded on the
//! teacher's environment-variable-backed provider credential loading in
//! `apps/gproxy`'s bootstrap, generalized into a named collaborator: a
//! `ref` is an opaque lookup key (typically an env var name), resolved at
//! call time rather than cached, so rotating the underlying process
//! environment takes effect without a restart.

use std::collections::HashMap;

pub trait SecretStore: Send + Sync {
    fn fetch(&self, reference: &str) -> Option<Vec<u8>>;
}

/// Resolves `reference` as an environment variable name.
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn fetch(&self, reference: &str) -> Option<Vec<u8>> {
        std::env::var(reference).ok().map(String::into_bytes)
    }
}

/// Fixed table, for tests and for operators who'd rather pass secrets
/// through config than the process environment.
#[derive(Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.secrets.insert(reference.into(), value.into());
    }
}

impl SecretStore for StaticSecretStore {
    fn fetch(&self, reference: &str) -> Option<Vec<u8>> {
        self.secrets.get(reference).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_store_returns_inserted_value() {
        let mut store = StaticSecretStore::new();
        store.insert("openai-primary", b"sk-test".to_vec());
        assert_eq!(store.fetch("openai-primary"), Some(b"sk-test".to_vec()));
        assert_eq!(store.fetch("missing"), None);
    }
}
