//! Shared data model and provider contract for the gateway's dispatch engine.
//!
//! This crate is deliberately thin on behavior: it defines the types the
//! Router, Dispatcher, and Provider Adapters all share (`DispatchRequest`,
//! `Candidate`, `Attempt`, `ProviderHealth`, `Principal`, `UsageRecord`,
//! `TraceEvent`, `GatewayError`) plus the `Provider` trait itself. It does
//! not depend on axum or any concrete HTTP client — `gproxy-provider-impl`
//! supplies the wiring.

pub mod candidate;
pub mod context;
pub mod error;
pub mod health;
pub mod principal;
pub mod provider;
pub mod request;
pub mod response;
pub mod shape;
pub mod sink;
pub mod stream_chunk;
pub mod trace;
pub mod usage;

pub use candidate::{Attempt, AttemptOutcome, Candidate};
pub use context::{AttemptContext, CancelSignal, DownstreamContext};
pub use error::{ErrorKind, GatewayError};
pub use health::{CircuitState, ProviderHealth};
pub use principal::{Principal, PrincipalKind, PrincipalRef};
pub use provider::{Provider, ProviderProbe, StreamSink};
pub use request::DispatchRequest;
pub use response::{NormalizedResponse, ProxyResponse, StreamBody};
pub use shape::ApiShape;
pub use sink::{TraceSink, UsageSink};
pub use stream_chunk::{ChunkUsage, StreamChunk};
pub use trace::{TraceEvent, TraceEventKind};
pub use usage::{CostTable, UsageRecord};
