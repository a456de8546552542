use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit opaque trace identifier, carried end-to-end through the dispatch
/// and recorded on every `TraceEvent` for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(u128);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// 64-bit unique per-request identifier, used as the deterministic-hash seed
/// for Router tie-breaks so that retries of the same request keep a stable
/// candidate ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        // high bits from a fresh UUIDv4, enough entropy for a non-persistent id.
        Self(Uuid::new_v4().as_u128() as u64)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
