use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Fine-grained trace event kind (§3). `seq` is dense within a trace (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Accepted,
    Routed,
    AttemptStarted,
    AttemptFinished,
    StreamedChunk,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: u128,
    pub seq: u64,
    pub kind: TraceEventKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub metadata: BTreeMap<String, String>,
}

impl TraceEvent {
    pub fn new(trace_id: u128, seq: u64, kind: TraceEventKind, timestamp: OffsetDateTime) -> Self {
        Self {
            trace_id,
            seq,
            kind,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
