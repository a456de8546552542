use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candidate::AttemptOutcome;
use crate::principal::PrincipalRef;
use crate::shape::ApiShape;

/// One per *completed* Attempt, emitted after the attempt terminates (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: u64,
    pub trace_id: u128,
    pub api_shape: ApiShape,
    pub alias_model: String,
    pub upstream_provider: String,
    pub upstream_model: String,
    pub status: UsageStatus,
    pub latency_ms: u64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_estimate: f64,
    #[serde(skip)]
    pub principal_ref: Option<PrincipalRef>,
    pub attempt_index: u32,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    RetryableFailure,
    FatalFailure,
    Cancelled,
}

impl From<AttemptOutcome> for UsageStatus {
    fn from(outcome: AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Success => UsageStatus::Success,
            AttemptOutcome::RetryableFailure => UsageStatus::RetryableFailure,
            AttemptOutcome::FatalFailure => UsageStatus::FatalFailure,
            AttemptOutcome::Cancelled => UsageStatus::Cancelled,
        }
    }
}

/// Per-`(provider, model)` USD rate table, `(input_per_1k, output_per_1k)`,
/// resolved by `upstreamModel` (SPEC_FULL.md cost-model Supplement).
/// Image/audio operations have no token count, so they're looked up by
/// operation name against a flat per-request rate instead.
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    per_token: HashMap<(String, String), (f64, f64)>,
    flat_per_operation: HashMap<String, f64>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token_rate(&mut self, provider_id: &str, model: &str, input_per_1k: f64, output_per_1k: f64) {
        self.per_token
            .insert((provider_id.to_string(), model.to_string()), (input_per_1k, output_per_1k));
    }

    pub fn set_flat_rate(&mut self, operation: &str, rate: f64) {
        self.flat_per_operation.insert(operation.to_string(), rate);
    }

    pub fn estimate_tokens(&self, provider_id: &str, model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
        let Some((input_per_1k, output_per_1k)) =
            self.per_token.get(&(provider_id.to_string(), model.to_string()))
        else {
            return 0.0;
        };
        (tokens_in as f64 / 1000.0) * input_per_1k + (tokens_out as f64 / 1000.0) * output_per_1k
    }

    pub fn estimate_flat(&self, operation: &str) -> f64 {
        self.flat_per_operation.get(operation).copied().unwrap_or(0.0)
    }
}
