//! Authorization Policy (§6: `AuthorizationPolicy.evaluate(principal,
//! action, resource) → allow|deny(reason)`). Grounded on the teacher's
//! scope-tag checks scattered through `apps/gproxy/src/admin.rs`,
//! generalized into one named collaborator the handler calls before
//! dispatch instead of repeating ad hoc role checks per route.

use gproxy_provider_core::principal::Principal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

pub trait AuthorizationPolicy: Send + Sync {
    fn evaluate(&self, principal: &Principal, action: &str, resource: &str) -> Decision;
}

/// Every authenticated principal may perform every action — the default for
/// a gateway whose principal model is "one shared API key per tenant"
/// rather than a fine-grained RBAC system (no admin console in scope).
pub struct AllowAuthenticatedPolicy;

impl AuthorizationPolicy for AllowAuthenticatedPolicy {
    fn evaluate(&self, _principal: &Principal, _action: &str, _resource: &str) -> Decision {
        Decision::Allow
    }
}

/// Denies unless the principal carries `role` in its role set, for
/// operators who do want a coarse-grained gate (e.g. restricting
/// `tasks/cancel` to an `operator` role).
pub struct RoleGatedPolicy {
    pub action: String,
    pub role: String,
}

impl AuthorizationPolicy for RoleGatedPolicy {
    fn evaluate(&self, principal: &Principal, action: &str, resource: &str) -> Decision {
        if action != self.action {
            return Decision::Allow;
        }
        if principal.has_role(&self.role) {
            Decision::Allow
        } else {
            Decision::Deny {
                reason: format!("principal {} lacks role {} for {action} on {resource}", principal.id, self.role),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use gproxy_provider_core::principal::PrincipalKind;

    use super::*;

    fn principal_with_roles(roles: &[&str]) -> Principal {
        Principal {
            kind: PrincipalKind::ApiKey,
            id: "u1".to_string(),
            scope_tags: BTreeSet::new(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn role_gated_policy_only_applies_to_its_action() {
        let policy = RoleGatedPolicy {
            action: "tasks/cancel".to_string(),
            role: "operator".to_string(),
        };
        let principal = principal_with_roles(&[]);
        assert_eq!(policy.evaluate(&principal, "tasks/send", "task-1"), Decision::Allow);
        assert!(matches!(policy.evaluate(&principal, "tasks/cancel", "task-1"), Decision::Deny { .. }));
    }

    #[test]
    fn role_gated_policy_allows_matching_role() {
        let policy = RoleGatedPolicy {
            action: "tasks/cancel".to_string(),
            role: "operator".to_string(),
        };
        let principal = principal_with_roles(&["operator"]);
        assert_eq!(policy.evaluate(&principal, "tasks/cancel", "task-1"), Decision::Allow);
    }
}
