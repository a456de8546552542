//! Config Source (§6: `ConfigSource.get(key) → value`). Thin adapter over
//! `GlobalConfig` (`gproxy-common::config`) so an alternate config backend
//! could be substituted without touching the core crates — the gateway
//! itself reads `GlobalConfig` fields directly at startup; this trait
//! exists for collaborators (e.g. a future admin surface) that want
//! key-based lookup instead of the typed struct.

use arc_swap::ArcSwap;
use gproxy_common::config::GlobalConfig;

pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Hot-swappable snapshot of `GlobalConfig`, grounded on the teacher's
/// `ArcSwap<GlobalConfig>` admin-reload pattern.
pub struct GlobalConfigSource {
    current: ArcSwap<GlobalConfig>,
}

impl GlobalConfigSource {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn snapshot(&self) -> std::sync::Arc<GlobalConfig> {
        self.current.load_full()
    }

    pub fn replace(&self, config: GlobalConfig) {
        self.current.store(std::sync::Arc::new(config));
    }
}

impl ConfigSource for GlobalConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        let config = self.current.load();
        match key {
            "host" => Some(config.host.clone()),
            "port" => Some(config.port.to_string()),
            "proxy" => config.proxy.clone(),
            "dispatch_budget" => Some(config.dispatch_budget.to_string()),
            "per_attempt_cap_ms" => Some(config.per_attempt_cap_ms.to_string()),
            "stream_idle_cap_ms" => Some(config.stream_idle_cap_ms.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GlobalConfig {
        GlobalConfig {
            host: "0.0.0.0".to_string(),
            port: 8787,
            proxy: None,
            dispatch_budget: 2,
            per_attempt_cap_ms: 30_000,
            stream_idle_cap_ms: 120_000,
        }
    }

    #[test]
    fn known_key_resolves_unknown_key_is_none() {
        let source = GlobalConfigSource::new(config());
        assert_eq!(source.get("port"), Some("8787".to_string()));
        assert_eq!(source.get("nope"), None);
    }

    #[test]
    fn replace_is_visible_to_subsequent_reads() {
        let source = GlobalConfigSource::new(config());
        let mut next = config();
        next.port = 9000;
        source.replace(next);
        assert_eq!(source.get("port"), Some("9000".to_string()));
    }
}
