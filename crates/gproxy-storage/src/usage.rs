//! Usage Repository (§6: `UsageRepository.append(batch)`) + the
//! `gproxy_provider_core::sink::UsageSink` bridge the Dispatcher actually
//! calls. Grounded on the teacher's `entities::upstream_usages` row shape,
//! collapsed into an in-memory ring buffer instead of a SQL table.

use std::sync::Mutex;

use gproxy_provider_core::sink::UsageSink;
use gproxy_provider_core::usage::UsageRecord;

/// §6 collaborator: `append(batch)` persists completed-Attempt usage
/// records. `list_recent` is this crate's own query surface (the spec
/// leaves read access unspecified), used by `/metrics` rendering and
/// admin-facing reporting.
pub trait UsageRepository: Send + Sync {
    fn append(&self, batch: Vec<UsageRecord>);
    fn list_recent(&self, limit: usize) -> Vec<UsageRecord>;
}

const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded ring buffer: oldest records drop once `capacity` is exceeded,
/// since this is a metrics/reporting aid, not an audit ledger.
pub struct InMemoryUsageRepository {
    capacity: usize,
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageRepository {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryUsageRepository {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl UsageRepository for InMemoryUsageRepository {
    fn append(&self, batch: Vec<UsageRecord>) {
        let mut records = self.records.lock().expect("usage repository lock poisoned");
        records.extend(batch);
        if records.len() > self.capacity {
            let overflow = records.len() - self.capacity;
            records.drain(0..overflow);
        }
    }

    fn list_recent(&self, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.lock().expect("usage repository lock poisoned");
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }
}

/// Adapts a `UsageRepository` to the Dispatcher's `UsageSink` (one record at
/// a time, not a batch — the Dispatcher emits per-attempt, not in bulk),
/// and reconciles the same record against `QuotaAdmission` (§4.3:
/// "reconciled on attempt completion using actual usage") so quota
/// bookkeeping stays a side effect of usage recording rather than a second
/// call site the Dispatcher would otherwise need to know about.
pub struct UsageSinkBridge<R: UsageRepository> {
    repository: std::sync::Arc<R>,
    quota: std::sync::Arc<gproxy_core::quota::QuotaAdmission>,
}

impl<R: UsageRepository> UsageSinkBridge<R> {
    pub fn new(repository: std::sync::Arc<R>, quota: std::sync::Arc<gproxy_core::quota::QuotaAdmission>) -> Self {
        Self { repository, quota }
    }
}

impl<R: UsageRepository> UsageSink for UsageSinkBridge<R> {
    fn record_usage(&self, record: UsageRecord) {
        use gproxy_provider_core::usage::UsageStatus;

        if let Some(principal) = &record.principal_ref {
            let fatal = matches!(record.status, UsageStatus::FatalFailure | UsageStatus::Cancelled);
            self.quota.reconcile(
                &principal.id,
                u64::from(record.tokens_in),
                u64::from(record.tokens_in),
                u64::from(record.tokens_out),
                record.cost_estimate,
                fatal,
                time::OffsetDateTime::now_utc(),
            );
        }
        self.repository.append(vec![record]);
    }
}

#[cfg(test)]
mod tests {
    use gproxy_provider_core::shape::ApiShape;
    use gproxy_provider_core::usage::UsageStatus;

    use super::*;

    fn record() -> UsageRecord {
        UsageRecord {
            request_id: 1,
            trace_id: 1,
            api_shape: ApiShape::Chat,
            alias_model: "gpt-4o-mini".to_string(),
            upstream_provider: "openai".to_string(),
            upstream_model: "gpt-4o-mini".to_string(),
            status: UsageStatus::Success,
            latency_ms: 10,
            tokens_in: 5,
            tokens_out: 5,
            cost_estimate: 0.01,
            principal_ref: None,
            attempt_index: 0,
            retry_count: 0,
        }
    }

    #[test]
    fn append_then_list_recent_round_trips() {
        let repo = InMemoryUsageRepository::new(2);
        repo.append(vec![record(), record(), record()]);
        assert_eq!(repo.list_recent(10).len(), 2);
    }
}
