use crate::trace::TraceEvent;
use crate::usage::UsageRecord;

/// §4.10 Usage Sink: receives one [`UsageRecord`] per completed Attempt.
/// Implementations live in `gproxy-storage`; the Dispatcher only needs this
/// narrow interface, not the storage crate's persistence details.
pub trait UsageSink: Send + Sync {
    fn record_usage(&self, record: UsageRecord);
}

/// §4.10 Trace Sink: receives one [`TraceEvent`] per state transition the
/// Dispatcher (or the A2A engine) emits.
pub trait TraceSink: Send + Sync {
    fn record_trace(&self, event: TraceEvent);
}
