//! In-memory implementations of the gateway's §6 collaborator interfaces
//! (`ConfigSource`, `SecretStore`, `UsageRepository`, `TraceRepository`,
//! `TaskRepository`, `AuthorizationPolicy`, `MetricsSink`) plus the
//! `CredentialRepository` Auth falls back to on a cache miss and the
//! `UsageSink`/`TraceSink` bridges the Dispatcher actually calls. No
//! durable persistence backend is in scope (§1 Non-goals) — every type
//! here is process-lifetime only, grounded on the teacher's SQL-backed
//! repositories with the schema collapsed into `DashMap`/`Mutex`-guarded
//! in-memory tables.

pub mod authz;
pub mod config_source;
pub mod credentials;
pub mod metrics;
pub mod secret_store;
pub mod task_repository;
pub mod trace;
pub mod usage;

pub use authz::{AllowAuthenticatedPolicy, AuthorizationPolicy, Decision, RoleGatedPolicy};
pub use config_source::{ConfigSource, GlobalConfigSource};
pub use credentials::InMemoryCredentialRepository;
pub use metrics::{InMemoryMetricsSink, MetricsSink};
pub use secret_store::{EnvSecretStore, SecretStore, StaticSecretStore};
pub use task_repository::{InMemoryTaskRepository, TaskRepository};
pub use trace::{InMemoryTraceRepository, TraceRepository, TraceSinkBridge};
pub use usage::{InMemoryUsageRepository, UsageRepository, UsageSinkBridge};
