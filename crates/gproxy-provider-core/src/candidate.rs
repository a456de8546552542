use time::OffsetDateTime;

use crate::error::ErrorKind;

/// A `(provider, upstreamModel, weight)` triple produced by the Router from
/// the alias table (§3, GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub provider_id: String,
    pub upstream_model: String,
    pub weight: u32,
}

impl Candidate {
    pub fn new(provider_id: impl Into<String>, upstream_model: impl Into<String>, weight: u32) -> Self {
        Self {
            provider_id: provider_id.into(),
            upstream_model: upstream_model.into(),
            weight,
        }
    }
}

/// Terminal outcome of one invocation of one Candidate (§3 `Attempt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    FatalFailure,
    Cancelled,
}

/// One invocation of one Candidate, appended to a per-request attempt log
/// and never mutated after `finished_at` is set (§3).
#[derive(Debug, Clone)]
pub struct Attempt {
    pub attempt_index: u32,
    pub candidate: Candidate,
    pub started_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
    pub outcome: Option<AttemptOutcome>,
    pub error_kind: Option<ErrorKind>,
    pub upstream_status: Option<u16>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_estimate: f64,
    pub bytes_streamed: u64,
}

impl Attempt {
    pub fn started(attempt_index: u32, candidate: Candidate, started_at: OffsetDateTime) -> Self {
        Self {
            attempt_index,
            candidate,
            started_at,
            finished_at: None,
            outcome: None,
            error_kind: None,
            upstream_status: None,
            tokens_in: 0,
            tokens_out: 0,
            cost_estimate: 0.0,
            bytes_streamed: 0,
        }
    }

    pub fn finish(
        &mut self,
        finished_at: OffsetDateTime,
        outcome: AttemptOutcome,
        error_kind: Option<ErrorKind>,
    ) {
        self.finished_at = Some(finished_at);
        self.outcome = Some(outcome);
        self.error_kind = error_kind;
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
