//! Operator-supplied providers/aliases file (§4.4 alias table, §4.6
//! provider credentials). Persistent configuration storage and the admin
//! web console are explicit Non-goals (spec.md §1); this is the minimal
//! file format an operator fills in by hand, resolved through
//! [`gproxy_storage::SecretStore`] rather than embedding API keys directly
//! in the file.

use std::collections::BTreeSet;
use std::fs;

use gproxy_provider_core::candidate::Candidate;
use gproxy_provider_core::principal::{Principal, PrincipalKind};
use gproxy_provider_impl::{ProviderConfig, ProviderKind, ProviderRegistry};
use gproxy_router::{AliasTable, ProviderCapabilities};
use gproxy_storage::{InMemoryCredentialRepository, SecretStore};
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileProviderKind {
    Openai,
    Anthropic,
    Gemini,
}

impl From<FileProviderKind> for ProviderKind {
    fn from(value: FileProviderKind) -> Self {
        match value {
            FileProviderKind::Openai => ProviderKind::OpenAi,
            FileProviderKind::Anthropic => ProviderKind::Anthropic,
            FileProviderKind::Gemini => ProviderKind::Gemini,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FileProvider {
    id: String,
    kind: FileProviderKind,
    #[serde(default)]
    base_url: Option<String>,
    /// Name of the environment variable (or `SecretStore` reference)
    /// holding this provider's API key — never the key itself.
    api_key_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FileCandidate {
    provider_id: String,
    upstream_model: String,
    #[serde(default = "default_weight")]
    weight: u32,
}

fn default_weight() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
struct FileAlias {
    alias: String,
    candidates: Vec<FileCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileTenantKind {
    ApiKey,
    BearerUser,
}

impl From<FileTenantKind> for PrincipalKind {
    fn from(value: FileTenantKind) -> Self {
        match value {
            FileTenantKind::ApiKey => PrincipalKind::ApiKey,
            FileTenantKind::BearerUser => PrincipalKind::BearerUser,
        }
    }
}

/// One accepted inbound caller credential (§4.2/§4.3): the credential
/// itself is resolved through `SecretStore`, same as provider API keys, so
/// it never sits in the gateway config file in the clear.
#[derive(Debug, Clone, Deserialize)]
struct FileTenant {
    principal_id: String,
    #[serde(default = "default_tenant_kind")]
    kind: FileTenantKind,
    credential_ref: String,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default)]
    scope_tags: BTreeSet<String>,
}

fn default_tenant_kind() -> FileTenantKind {
    FileTenantKind::ApiKey
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    providers: Vec<FileProvider>,
    #[serde(default)]
    aliases: Vec<FileAlias>,
    #[serde(default)]
    tenants: Vec<FileTenant>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayConfigError {
    #[error("reading gateway config {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("parsing gateway config {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
    #[error("provider {provider_id} references secret {secret_ref}, which the secret store could not resolve")]
    MissingSecret { provider_id: String, secret_ref: String },
}

pub struct GatewayConfig {
    pub provider_configs: Vec<ProviderConfig>,
    alias_definitions: Vec<FileAlias>,
    provider_ids: Vec<String>,
    tenant_credentials: Vec<([u8; 32], Principal)>,
}

impl GatewayConfig {
    /// Builds the §4.4 alias table once the registry exists, reading each
    /// configured provider's declared `supported_shapes()` straight off the
    /// built adapter rather than duplicating the capability list in the
    /// config file.
    pub fn build_alias_table(&self, registry: &ProviderRegistry) -> AliasTable {
        let mut aliases = AliasTable::new();
        for provider_id in &self.provider_ids {
            if let Some(provider) = registry.get(provider_id) {
                aliases.insert_capabilities(ProviderCapabilities {
                    provider_id: provider_id.clone(),
                    supported_shapes: provider.supported_shapes().to_vec(),
                });
            }
        }
        for alias in &self.alias_definitions {
            let candidates = alias
                .candidates
                .iter()
                .map(|c| Candidate::new(c.provider_id.clone(), c.upstream_model.clone(), c.weight))
                .collect();
            aliases.insert_alias(alias.alias.clone(), candidates);
        }
        aliases
    }

    /// Registers every configured tenant credential into `repository`, so
    /// `CredentialCache` has a repository-backed fallback on its first
    /// lookup for each caller (§4.2).
    pub fn register_tenants(&self, repository: &InMemoryCredentialRepository) {
        for (hash, principal) in &self.tenant_credentials {
            repository.register(*hash, principal.clone());
        }
    }
}

fn hash_credential(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Loads and resolves `path` into provider credentials (§4.6). A missing
/// file is treated as an empty configuration — useful for a bare
/// smoke-test boot with only the direct-route escape hatch
/// (`"<providerId>/<upstreamModel>"`) available.
pub fn load(path: &str, secrets: &dyn SecretStore) -> Result<GatewayConfig, GatewayConfigError> {
    let file = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(GatewayConfig {
                provider_configs: Vec::new(),
                alias_definitions: Vec::new(),
                provider_ids: Vec::new(),
                tenant_credentials: Vec::new(),
            });
        }
        Err(err) => {
            return Err(GatewayConfigError::Read {
                path: path.to_string(),
                source: err,
            });
        }
    };

    let parsed: FileConfig = serde_json::from_str(&file).map_err(|err| GatewayConfigError::Parse {
        path: path.to_string(),
        source: err,
    })?;

    let mut provider_configs = Vec::with_capacity(parsed.providers.len());
    let mut provider_ids = Vec::with_capacity(parsed.providers.len());
    for provider in &parsed.providers {
        let key_bytes = secrets.fetch(&provider.api_key_ref).ok_or_else(|| GatewayConfigError::MissingSecret {
            provider_id: provider.id.clone(),
            secret_ref: provider.api_key_ref.clone(),
        })?;
        let api_key = String::from_utf8_lossy(&key_bytes).trim().to_string();
        provider_configs.push(ProviderConfig {
            provider_id: provider.id.clone(),
            kind: provider.kind.clone().into(),
            base_url: provider.base_url.clone(),
            api_key,
        });
        provider_ids.push(provider.id.clone());
    }

    let mut tenant_credentials = Vec::with_capacity(parsed.tenants.len());
    for tenant in &parsed.tenants {
        let credential_bytes = secrets.fetch(&tenant.credential_ref).ok_or_else(|| GatewayConfigError::MissingSecret {
            provider_id: tenant.principal_id.clone(),
            secret_ref: tenant.credential_ref.clone(),
        })?;
        let credential = String::from_utf8_lossy(&credential_bytes).trim().to_string();
        let principal = Principal {
            kind: tenant.kind.clone().into(),
            id: tenant.principal_id.clone(),
            scope_tags: tenant.scope_tags.clone(),
            roles: tenant.roles.clone(),
        };
        tenant_credentials.push((hash_credential(&credential), principal));
    }

    Ok(GatewayConfig {
        provider_configs,
        alias_definitions: parsed.aliases,
        provider_ids,
        tenant_credentials,
    })
}
