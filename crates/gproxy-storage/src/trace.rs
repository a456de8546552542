//! Trace Repository (§6: `TraceRepository.append(batch)`) + the
//! `gproxy_provider_core::sink::TraceSink` bridge. Grounded on the
//! teacher's `entities::upstream_requests` trace-log rows, collapsed into
//! an in-memory per-trace event log instead of a SQL table.

use std::sync::Mutex;

use dashmap::DashMap;
use gproxy_provider_core::sink::TraceSink;
use gproxy_provider_core::trace::TraceEvent;

pub trait TraceRepository: Send + Sync {
    fn append(&self, batch: Vec<TraceEvent>);
    fn events_for(&self, trace_id: u128) -> Vec<TraceEvent>;
}

const MAX_TRACES: usize = 5_000;
const MAX_EVENTS_PER_TRACE: usize = 500;

/// Keeps the most recently touched `MAX_TRACES` trace ids; each trace's own
/// event log is capped independently (mirrors the A2A Task Engine's
/// per-task log retention, `gproxy-a2a/src/engine.rs::EVENT_LOG_RETENTION`).
pub struct InMemoryTraceRepository {
    traces: DashMap<u128, Vec<TraceEvent>>,
    insertion_order: Mutex<Vec<u128>>,
}

impl InMemoryTraceRepository {
    pub fn new() -> Self {
        Self {
            traces: DashMap::new(),
            insertion_order: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTraceRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRepository for InMemoryTraceRepository {
    fn append(&self, batch: Vec<TraceEvent>) {
        let mut newly_seen = Vec::new();
        for event in batch {
            let trace_id = event.trace_id;
            let is_new = !self.traces.contains_key(&trace_id);
            let mut entry = self.traces.entry(trace_id).or_default();
            entry.push(event);
            if entry.len() > MAX_EVENTS_PER_TRACE {
                let overflow = entry.len() - MAX_EVENTS_PER_TRACE;
                entry.drain(0..overflow);
            }
            drop(entry);
            if is_new {
                newly_seen.push(trace_id);
            }
        }

        if newly_seen.is_empty() {
            return;
        }
        let mut order = self.insertion_order.lock().expect("trace repository lock poisoned");
        order.extend(newly_seen);
        while order.len() > MAX_TRACES {
            let evicted = order.remove(0);
            self.traces.remove(&evicted);
        }
    }

    fn events_for(&self, trace_id: u128) -> Vec<TraceEvent> {
        self.traces.get(&trace_id).map(|entry| entry.clone()).unwrap_or_default()
    }
}

pub struct TraceSinkBridge<R: TraceRepository> {
    repository: std::sync::Arc<R>,
}

impl<R: TraceRepository> TraceSinkBridge<R> {
    pub fn new(repository: std::sync::Arc<R>) -> Self {
        Self { repository }
    }
}

impl<R: TraceRepository> TraceSink for TraceSinkBridge<R> {
    fn record_trace(&self, event: TraceEvent) {
        self.repository.append(vec![event]);
    }
}

#[cfg(test)]
mod tests {
    use gproxy_provider_core::trace::TraceEventKind;
    use time::OffsetDateTime;

    use super::*;

    #[test]
    fn events_group_by_trace_id() {
        let repo = InMemoryTraceRepository::new();
        let now = OffsetDateTime::now_utc();
        repo.append(vec![
            TraceEvent::new(1, 0, TraceEventKind::Accepted, now),
            TraceEvent::new(2, 0, TraceEventKind::Accepted, now),
            TraceEvent::new(1, 1, TraceEventKind::Routed, now),
        ]);
        assert_eq!(repo.events_for(1).len(), 2);
        assert_eq!(repo.events_for(2).len(), 1);
    }
}
