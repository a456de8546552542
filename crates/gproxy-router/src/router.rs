use std::sync::Arc;

use gproxy_provider_core::candidate::Candidate;
use gproxy_provider_core::shape::ApiShape;
use time::OffsetDateTime;

use crate::alias::AliasTable;
use crate::circuit::CircuitRegistry;
use crate::hash::tie_break_hash;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown model alias: {0}")]
    UnknownModel(String),
    #[error("all providers cooling down for alias: {0}")]
    AllProvidersCoolingDown(String),
}

/// Implements §4.4 `resolve(modelAlias, apiShape) -> ordered []Candidate`.
pub struct Router {
    aliases: Arc<AliasTable>,
    circuits: Arc<CircuitRegistry>,
    budget: u32,
}

impl Router {
    pub fn new(aliases: Arc<AliasTable>, circuits: Arc<CircuitRegistry>, budget: u32) -> Self {
        Self {
            aliases,
            circuits,
            budget,
        }
    }

    pub fn resolve(
        &self,
        model_alias: &str,
        api_shape: ApiShape,
        request_id: u64,
        now: OffsetDateTime,
    ) -> Result<Vec<Candidate>, RouteError> {
        // Step 1: direct-route escape hatch.
        if let Some((provider_id, upstream_model)) = model_alias.split_once('/') {
            return Ok(vec![Candidate::new(provider_id, upstream_model, 1)]);
        }

        // Step 2: alias table lookup.
        let all_candidates = self
            .aliases
            .candidates_for(model_alias)
            .ok_or_else(|| RouteError::UnknownModel(model_alias.to_string()))?;

        if all_candidates.is_empty() {
            return Err(RouteError::UnknownModel(model_alias.to_string()));
        }

        // Steps 3-4: filter cooling-down providers and shape-unsupported providers.
        let mut filtered: Vec<Candidate> = all_candidates
            .iter()
            .filter(|candidate| !self.circuits.is_cooling_down(&candidate.provider_id, now))
            .filter(|candidate| self.aliases.supports(&candidate.provider_id, api_shape))
            .cloned()
            .collect();

        if filtered.is_empty() {
            return Err(RouteError::AllProvidersCoolingDown(model_alias.to_string()));
        }

        // Step 5: sort by weight descending, tie-break by deterministic hash.
        filtered.sort_by(|a, b| {
            b.weight.cmp(&a.weight).then_with(|| {
                let ha = tie_break_hash(request_id, &a.provider_id);
                let hb = tie_break_hash(request_id, &b.provider_id);
                ha.cmp(&hb)
            })
        });

        // Step 6: truncate to the attempt budget.
        filtered.truncate(self.budget as usize);
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::ProviderCapabilities;
    use crate::circuit::CircuitConfig;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn router_with(candidates: Vec<Candidate>, budget: u32) -> Router {
        let mut aliases = AliasTable::new();
        for candidate in &candidates {
            aliases.insert_capabilities(ProviderCapabilities {
                provider_id: candidate.provider_id.clone(),
                supported_shapes: vec![ApiShape::Chat],
            });
        }
        aliases.insert_alias("gpt-4o-mini", candidates);
        let circuits = Arc::new(CircuitRegistry::new(CircuitConfig::default()));
        Router::new(Arc::new(aliases), circuits, budget)
    }

    #[test]
    fn direct_route_bypasses_alias_table() {
        let router = router_with(vec![], 2);
        let resolved = router
            .resolve("openai/gpt-4o", ApiShape::Chat, 1, now())
            .unwrap();
        assert_eq!(resolved, vec![Candidate::new("openai", "gpt-4o", 1)]);
    }

    #[test]
    fn sorts_by_weight_descending_and_truncates_to_budget() {
        let router = router_with(
            vec![
                Candidate::new("a", "m", 80),
                Candidate::new("b", "m", 100),
                Candidate::new("c", "m", 50),
            ],
            2,
        );
        let resolved = router
            .resolve("gpt-4o-mini", ApiShape::Chat, 1, now())
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].provider_id, "b");
        assert_eq!(resolved[1].provider_id, "a");
    }

    #[test]
    fn unknown_alias_errors() {
        let router = router_with(vec![], 2);
        let err = router
            .resolve("does-not-exist", ApiShape::Chat, 1, now())
            .unwrap_err();
        assert_eq!(err, RouteError::UnknownModel("does-not-exist".to_string()));
    }

    #[test]
    fn all_cooling_down_is_distinct_from_unknown() {
        let candidates = vec![Candidate::new("a", "m", 100)];
        let router = router_with(candidates, 2);
        router.circuits.record_failure("a", now());
        for _ in 0..4 {
            router.circuits.record_failure("a", now());
        }
        let err = router
            .resolve("gpt-4o-mini", ApiShape::Chat, 1, now())
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::AllProvidersCoolingDown("gpt-4o-mini".to_string())
        );
    }
}
