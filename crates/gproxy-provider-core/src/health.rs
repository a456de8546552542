use time::OffsetDateTime;

/// Per-provider circuit state (§3 `ProviderHealth`, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// One per `providerId`, process-lifetime (§3). Mutated only under the
/// provider's own lock (`gproxy-router::circuit` owns the registry and the
/// transition logic); this struct is the plain data snapshot readers may
/// observe without a lock, at the cost of staleness the spec explicitly
/// permits ("read without lock is permitted but may be stale").
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<OffsetDateTime>,
    pub inflight_probes: u32,
    pub last_transition_at: OffsetDateTime,
}

impl ProviderHealth {
    pub fn new_closed(now: OffsetDateTime) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            cooldown_until: None,
            inflight_probes: 0,
            last_transition_at: now,
        }
    }

    /// Whether a candidate from this provider should be filtered out of a
    /// route resolution right now (§4.4 step 3).
    pub fn is_cooling_down(&self, now: OffsetDateTime) -> bool {
        matches!(self.state, CircuitState::Open)
            && self.cooldown_until.is_some_and(|until| now < until)
    }
}
