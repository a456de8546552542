use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kind of credential that resolved to this principal (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    ApiKey,
    BearerUser,
}

/// An authenticated caller, resolved by Auth from a credential (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub id: String,
    pub scope_tags: BTreeSet<String>,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_scope(&self, tag: &str) -> bool {
        self.scope_tags.contains(tag)
    }
}

/// Cheap-to-clone handle threaded through `DispatchRequest`, `UsageRecord`,
/// and quota admission so the full `Principal` need not be cloned per call.
pub type PrincipalRef = Arc<Principal>;
