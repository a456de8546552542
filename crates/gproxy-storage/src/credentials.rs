//! In-memory backing store for `gproxy_core::auth::CredentialRepository`
//! (§4.2's "a miss falls back to the repository"). Grounded on the
//! teacher's `entities::api_keys`/`entities::credentials` rows, collapsed
//! from a SQL schema into a single `DashMap` keyed by the same SHA-256
//! hash the cache uses, since no persistence backend is in scope here.

use dashmap::DashMap;
use gproxy_core::auth::{CredentialLookup, CredentialRepository};
use gproxy_provider_core::principal::Principal;

struct StoredCredential {
    principal: Principal,
    revoked: bool,
}

/// Operator-populated table of `sha256(credential) -> Principal`. Built at
/// startup from `GlobalConfig`-adjacent operator input (`apps/gproxy`);
/// `revoke`/`register` exist for programmatic mutation in tests and for a
/// future admin surface, not used by the request path itself.
#[derive(Default)]
pub struct InMemoryCredentialRepository {
    entries: DashMap<[u8; 32], StoredCredential>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, credential_hash: [u8; 32], principal: Principal) {
        self.entries.insert(
            credential_hash,
            StoredCredential {
                principal,
                revoked: false,
            },
        );
    }

    pub fn revoke(&self, credential_hash: &[u8; 32]) {
        if let Some(mut entry) = self.entries.get_mut(credential_hash) {
            entry.revoked = true;
        }
    }
}

impl CredentialRepository for InMemoryCredentialRepository {
    fn lookup(&self, credential_hash: &[u8; 32]) -> Option<CredentialLookup> {
        self.entries.get(credential_hash).map(|entry| CredentialLookup {
            principal: entry.principal.clone(),
            revoked: entry.revoked,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use gproxy_provider_core::principal::PrincipalKind;

    use super::*;

    fn hash(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn registered_credential_resolves_and_revocation_sticks() {
        let repo = InMemoryCredentialRepository::new();
        let principal = Principal {
            kind: PrincipalKind::ApiKey,
            id: "tenant-a".to_string(),
            scope_tags: BTreeSet::new(),
            roles: BTreeSet::new(),
        };
        repo.register(hash(1), principal);
        assert!(repo.lookup(&hash(1)).is_some());
        assert!(repo.lookup(&hash(2)).is_none());

        repo.revoke(&hash(1));
        assert!(repo.lookup(&hash(1)).unwrap().revoked);
    }
}
