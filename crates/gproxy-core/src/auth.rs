use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use gproxy_provider_core::principal::{Principal, PrincipalKind, PrincipalRef};
use http::HeaderMap;
use sha2::{Digest, Sha256};

/// §4.2 Auth failure modes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("no credential presented")]
    Unauthenticated,
    #[error("credential not recognized")]
    InvalidCredential,
    #[error("credential has been revoked")]
    Revoked,
}

/// The persistence-backed collaborator Auth falls back to on a cache miss.
/// Not part of §6's named collaborator list verbatim, but implied by §4.2
/// ("a miss falls back to the repository"); implementations live in
/// `gproxy-storage`.
pub trait CredentialRepository: Send + Sync {
    fn lookup(&self, credential_hash: &[u8; 32]) -> Option<CredentialLookup>;
}

pub struct CredentialLookup {
    pub principal: Principal,
    pub revoked: bool,
}

struct CacheEntry {
    principal: PrincipalRef,
    expires_at: Instant,
}

/// In-memory cache keyed by SHA-256 of the credential (§4.2). A hit
/// refreshes the entry's TTL; admin mutations invalidate by removing the
/// entry for the affected hash (`invalidate`).
pub struct CredentialCache {
    entries: DashMap<[u8; 32], CacheEntry>,
    ttl: Duration,
    repository: Arc<dyn CredentialRepository>,
}

/// Snapshot alias kept for symmetry with the teacher's `MemoryAuth`
/// terminology; here it names the cache's current state rather than a
/// separate `ArcSwap` layer, since invalidation is per-entry rather than
/// whole-table swap.
pub type AuthSnapshot = CredentialCache;

impl CredentialCache {
    pub fn new(repository: Arc<dyn CredentialRepository>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            repository,
        }
    }

    pub fn invalidate(&self, credential_hash: &[u8; 32]) {
        self.entries.remove(credential_hash);
    }

    /// `authenticate(headers) -> Principal` (§4.2). `gemini_ingress` gates
    /// whether `x-goog-api-key` is considered, since that header "maps to
    /// Gemini-shape ingress only".
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        gemini_ingress: bool,
    ) -> Result<PrincipalRef, AuthError> {
        let token = extract_credential(headers, gemini_ingress).ok_or(AuthError::Unauthenticated)?;
        let hash = hash_credential(&token);

        if let Some(mut entry) = self.entries.get_mut(&hash) {
            entry.expires_at = Instant::now() + self.ttl;
            return Ok(entry.principal.clone());
        }

        let lookup = self.repository.lookup(&hash).ok_or(AuthError::InvalidCredential)?;
        if lookup.revoked {
            return Err(AuthError::Revoked);
        }

        let principal: PrincipalRef = Arc::new(lookup.principal);
        self.entries.insert(
            hash,
            CacheEntry {
                principal: principal.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(principal)
    }
}

fn hash_credential(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Three credential carriers with equal precedence in the order presented
/// (§4.2): `Authorization: Bearer`, `x-api-key`, `x-goog-api-key`.
fn extract_credential(headers: &HeaderMap, gemini_ingress: bool) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ").or_else(|| text.strip_prefix("bearer ")) {
                return Some(token.trim().to_string());
            }
        }
    }
    if let Some(value) = headers.get("x-api-key") {
        if let Ok(text) = value.to_str() {
            return Some(text.trim().to_string());
        }
    }
    if gemini_ingress {
        if let Some(value) = headers.get("x-goog-api-key") {
            if let Ok(text) = value.to_str() {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

/// Convenience constructor used by callers that only need a bare kind/id
/// principal (e.g. tests, or a `NoopRepository`).
pub fn simple_principal(kind: PrincipalKind, id: impl Into<String>) -> Principal {
    Principal {
        kind,
        id: id.into(),
        scope_tags: BTreeSet::new(),
        roles: BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticRepository {
        principal: Principal,
    }

    impl CredentialRepository for StaticRepository {
        fn lookup(&self, _hash: &[u8; 32]) -> Option<CredentialLookup> {
            Some(CredentialLookup {
                principal: self.principal.clone(),
                revoked: false,
            })
        }
    }

    #[test]
    fn bearer_precedes_api_key_when_both_present() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Bearer tok-a".parse().unwrap());
        headers.insert("x-api-key", "tok-b".parse().unwrap());
        let extracted = extract_credential(&headers, false).unwrap();
        assert_eq!(extracted, "tok-a");
    }

    #[test]
    fn goog_header_ignored_outside_gemini_ingress() {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", "tok-g".parse().unwrap());
        assert!(extract_credential(&headers, false).is_none());
        assert_eq!(extract_credential(&headers, true).unwrap(), "tok-g");
    }

    #[test]
    fn cache_hit_avoids_repository_lookup() {
        let repo = Arc::new(StaticRepository {
            principal: simple_principal(PrincipalKind::ApiKey, "user-1"),
        });
        let cache = CredentialCache::new(repo, Duration::from_secs(60));
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "tok".parse().unwrap());
        let first = cache.authenticate(&headers, false).unwrap();
        let second = cache.authenticate(&headers, false).unwrap();
        assert_eq!(first.id, second.id);
    }
}
