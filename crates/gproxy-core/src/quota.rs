use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use gproxy_common::time_window::Window;
use time::OffsetDateTime;

/// Which counter a deny decision was triggered by (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDenyKind {
    Requests,
    Tokens,
    Cost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuotaDecision {
    Allow,
    Deny {
        kind: QuotaDenyKind,
        retry_after: Duration,
    },
}

/// Per-window admission limits for one principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaLimits {
    pub max_requests: Option<u64>,
    pub max_tokens: Option<u64>,
    pub max_cost: Option<f64>,
}

/// What the caller expects the upcoming attempt to cost, used for
/// provisional admission (§4.3: "updated provisionally on admission using
/// `estimate.tokensIn`").
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaEstimate {
    pub tokens_in: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    requests: u64,
    tokens: u64,
    cost: f64,
}

#[derive(Default)]
struct PrincipalCounters {
    buckets: HashMap<(Window, i64), Counters>,
}

/// Window-based admission control (§4.3). Sharded by principal id (§5:
/// "contention is reduced by sharding by principal hash") via `DashMap`'s
/// own internal sharding.
pub struct QuotaAdmission {
    limits: HashMap<String, QuotaLimits>,
    default_limits: QuotaLimits,
    principals: DashMap<String, PrincipalCounters>,
}

impl QuotaAdmission {
    pub fn new(default_limits: QuotaLimits) -> Self {
        Self {
            limits: HashMap::new(),
            default_limits,
            principals: DashMap::new(),
        }
    }

    pub fn set_limits(&mut self, principal_id: impl Into<String>, limits: QuotaLimits) {
        self.limits.insert(principal_id.into(), limits);
    }

    fn limits_for(&self, principal_id: &str) -> QuotaLimits {
        self.limits.get(principal_id).copied().unwrap_or(self.default_limits)
    }

    /// `admit(principal, estimate) -> Decision` (§4.3).
    pub fn admit(
        &self,
        principal_id: &str,
        estimate: QuotaEstimate,
        now: OffsetDateTime,
    ) -> QuotaDecision {
        let limits = self.limits_for(principal_id);
        let mut entry = self.principals.entry(principal_id.to_string()).or_default();

        for (window, bucket) in Window::ALL.iter().map(|w| (*w, w.bucket_key(now))) {
            let counters = entry.buckets.entry((window, bucket)).or_default();

            if let Some(max_requests) = limits.max_requests {
                if counters.requests + 1 > max_requests {
                    return QuotaDecision::Deny {
                        kind: QuotaDenyKind::Requests,
                        retry_after: window_retry_after(window),
                    };
                }
            }
            if let Some(max_tokens) = limits.max_tokens {
                if counters.tokens + estimate.tokens_in > max_tokens {
                    return QuotaDecision::Deny {
                        kind: QuotaDenyKind::Tokens,
                        retry_after: window_retry_after(window),
                    };
                }
            }
            if let Some(max_cost) = limits.max_cost {
                if counters.cost >= max_cost {
                    return QuotaDecision::Deny {
                        kind: QuotaDenyKind::Cost,
                        retry_after: window_retry_after(window),
                    };
                }
            }
        }

        for (window, bucket) in Window::ALL.iter().map(|w| (*w, w.bucket_key(now))) {
            let counters = entry.buckets.entry((window, bucket)).or_default();
            counters.requests += 1;
            counters.tokens += estimate.tokens_in;
        }
        QuotaDecision::Allow
    }

    /// Reconcile provisional counters with actual usage once an attempt
    /// terminates (§4.3: "reconciled on attempt completion using actual
    /// usage"). `fatal` rolls the provisional request+token delta back
    /// entirely instead of replacing it with actuals.
    pub fn reconcile(
        &self,
        principal_id: &str,
        estimated_tokens_in: u64,
        actual_tokens_in: u64,
        actual_tokens_out: u64,
        actual_cost: f64,
        fatal: bool,
        now: OffsetDateTime,
    ) {
        let mut entry = self.principals.entry(principal_id.to_string()).or_default();
        for (window, bucket) in Window::ALL.iter().map(|w| (*w, w.bucket_key(now))) {
            let counters = entry.buckets.entry((window, bucket)).or_default();
            if fatal {
                counters.requests = counters.requests.saturating_sub(1);
                counters.tokens = counters.tokens.saturating_sub(estimated_tokens_in);
            } else {
                counters.tokens = counters
                    .tokens
                    .saturating_sub(estimated_tokens_in)
                    .saturating_add(actual_tokens_in)
                    .saturating_add(actual_tokens_out);
                counters.cost += actual_cost;
            }
        }
    }
}

fn window_retry_after(window: Window) -> Duration {
    match window {
        Window::Minute => Duration::from_secs(60),
        Window::Hour => Duration::from_secs(60 * 60),
        Window::Day => Duration::from_secs(24 * 60 * 60),
        Window::Month => Duration::from_secs(30 * 24 * 60 * 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn denies_once_request_limit_reached() {
        let mut admission = QuotaAdmission::new(QuotaLimits::default());
        admission.set_limits(
            "u1",
            QuotaLimits {
                max_requests: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(
            admission.admit("u1", QuotaEstimate::default(), now()),
            QuotaDecision::Allow
        );
        assert!(matches!(
            admission.admit("u1", QuotaEstimate::default(), now()),
            QuotaDecision::Deny {
                kind: QuotaDenyKind::Requests,
                ..
            }
        ));
    }

    #[test]
    fn denies_once_cost_limit_reached() {
        let mut admission = QuotaAdmission::new(QuotaLimits::default());
        admission.set_limits(
            "u1",
            QuotaLimits {
                max_cost: Some(1.0),
                ..Default::default()
            },
        );
        assert_eq!(
            admission.admit("u1", QuotaEstimate::default(), now()),
            QuotaDecision::Allow
        );
        admission.reconcile("u1", 0, 0, 0, 1.0, false, now());
        assert!(matches!(
            admission.admit("u1", QuotaEstimate::default(), now()),
            QuotaDecision::Deny {
                kind: QuotaDenyKind::Cost,
                ..
            }
        ));
    }

    #[test]
    fn fatal_failure_rolls_back_provisional_increment() {
        let mut admission = QuotaAdmission::new(QuotaLimits::default());
        admission.set_limits(
            "u1",
            QuotaLimits {
                max_requests: Some(1),
                ..Default::default()
            },
        );
        admission.admit("u1", QuotaEstimate { tokens_in: 10 }, now());
        admission.reconcile("u1", 10, 0, 0, 0.0, true, now());
        assert_eq!(
            admission.admit("u1", QuotaEstimate::default(), now()),
            QuotaDecision::Allow
        );
    }
}
