//! CLI/ENV entry (§1 Non-goals: configuration loading itself is an external
//! collaborator; this is the thin operator-facing surface that assembles a
//! [`gproxy_common::config::GlobalConfig`] from it). Grounded on the
//! teacher's `bootstrap::CliArgs` clap pattern (CLI > ENV > defaults), with
//! the DSN/admin-key/event-redaction fields the web console and SQL storage
//! needed dropped, since neither is in scope here.

use clap::Parser;
use gproxy_common::config::{GlobalConfig, GlobalConfigPatch};

#[derive(Debug, Clone, Parser)]
#[command(name = "gproxy", version, about = "Unified multi-tenant AI provider gateway")]
pub struct CliArgs {
    /// Bind host.
    #[arg(long, env = "GPROXY_HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "GPROXY_PORT")]
    pub port: Option<u16>,

    /// Outbound proxy for upstream egress.
    #[arg(long, env = "GPROXY_PROXY")]
    pub proxy: Option<String>,

    /// Dispatcher attempt budget `B` (§4.5), default 2.
    #[arg(long, env = "GPROXY_DISPATCH_BUDGET")]
    pub dispatch_budget: Option<u32>,

    /// Per-attempt deadline cap for non-streaming calls, in milliseconds.
    #[arg(long, env = "GPROXY_PER_ATTEMPT_CAP_MS")]
    pub per_attempt_cap_ms: Option<u64>,

    /// Total idle cap for streaming calls, in milliseconds.
    #[arg(long, env = "GPROXY_STREAM_IDLE_CAP_MS")]
    pub stream_idle_cap_ms: Option<u64>,

    /// Path to the providers/aliases JSON file (§4.4, §4.6 wiring).
    #[arg(long, env = "GPROXY_CONFIG", default_value = "./gproxy.json")]
    pub config: String,
}

impl CliArgs {
    /// CLI/ENV values (clap already resolved CLI > ENV per field) overlaid
    /// onto defaults, mirroring the teacher's `GlobalConfigPatch::overlay`
    /// merge order.
    pub fn global_config(&self) -> Result<GlobalConfig, gproxy_common::config::GlobalConfigError> {
        let mut merged = GlobalConfigPatch::default();
        merged.overlay(GlobalConfigPatch {
            host: self.host.clone(),
            port: self.port,
            proxy: self.proxy.clone(),
            dispatch_budget: self.dispatch_budget,
            per_attempt_cap_ms: self.per_attempt_cap_ms,
            stream_idle_cap_ms: self.stream_idle_cap_ms,
        });
        merged.into_config()
    }
}
