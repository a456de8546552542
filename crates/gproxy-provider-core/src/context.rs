use time::OffsetDateTime;
use tokio::sync::watch;

use crate::principal::PrincipalRef;

/// Per-request context, constructed once by the Decoder/Auth stages and
/// threaded down to the Dispatcher (mirrors the teacher's
/// `DownstreamContext`, generalized with the principal and deadline the
/// spec's Dispatcher needs).
#[derive(Clone)]
pub struct DownstreamContext {
    pub trace_id: u128,
    pub request_id: u64,
    pub principal: PrincipalRef,
    pub deadline: OffsetDateTime,
    pub user_agent: Option<String>,
}

/// A cheap cancellation signal: `cancel()` flips the watch, every clone of
/// `cancelled()` observes it. Used instead of a dedicated crate since the
/// gateway only needs a single fire-once flag per request, not a tree of
/// derived tokens.
#[derive(Clone)]
pub struct CancelSignal {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Context passed to the Adapter for a single attempt (§4.5, §4.6): carries
/// the attempt's own deadline (already reduced by the safety margin divided
/// among remaining budget, per §4.5) and the cancellation signal propagated
/// from caller disconnect or Dispatcher-level cancellation (§5).
#[derive(Clone)]
pub struct AttemptContext {
    pub trace_id: u128,
    pub request_id: u64,
    pub attempt_index: u32,
    pub deadline: OffsetDateTime,
    pub cancel: CancelSignal,
}

impl AttemptContext {
    pub fn remaining(&self, now: OffsetDateTime) -> std::time::Duration {
        let remaining = self.deadline - now;
        if remaining.is_negative() {
            std::time::Duration::ZERO
        } else {
            remaining.unsigned_abs()
        }
    }
}
