use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged global configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    /// Dispatcher attempt budget `B` (§4.5); number of candidates tried per request.
    pub dispatch_budget: u32,
    /// Per-attempt deadline cap for non-streaming calls, in milliseconds.
    pub per_attempt_cap_ms: u64,
    /// Total idle cap for streaming calls, in milliseconds.
    pub stream_idle_cap_ms: u64,
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: Option<String>,
    pub dispatch_budget: Option<u32>,
    pub per_attempt_cap_ms: Option<u64>,
    pub stream_idle_cap_ms: Option<u64>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.dispatch_budget.is_some() {
            self.dispatch_budget = other.dispatch_budget;
        }
        if other.per_attempt_cap_ms.is_some() {
            self.per_attempt_cap_ms = other.per_attempt_cap_ms;
        }
        if other.stream_idle_cap_ms.is_some() {
            self.stream_idle_cap_ms = other.stream_idle_cap_ms;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(8787),
            proxy: self.proxy,
            dispatch_budget: self.dispatch_budget.unwrap_or(2),
            per_attempt_cap_ms: self.per_attempt_cap_ms.unwrap_or(30_000),
            stream_idle_cap_ms: self.stream_idle_cap_ms.unwrap_or(120_000),
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            proxy: value.proxy,
            dispatch_budget: Some(value.dispatch_budget),
            per_attempt_cap_ms: Some(value.per_attempt_cap_ms),
            stream_idle_cap_ms: Some(value.stream_idle_cap_ms),
        }
    }
}
