//! Process entry point (§6): CLI/ENV config, collaborator wiring, HTTP
//! listener bind. Grounded on the teacher's `main.rs` "bootstrap, build
//! router, serve" shape, with the admin web console and SQL-backed
//! bootstrap it used to assemble replaced by the file-based
//! [`gateway_config`] loader and the in-memory collaborators
//! `gproxy-storage` provides — the HTTP listener itself and config loading
//! are external collaborators per spec.md §1, so this file is intentionally
//! thin plumbing rather than a place new behavior lives.

mod a2a_http;
mod cli;
mod dispatch_bridge;
mod gateway_config;
mod metrics_route;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::get;
use clap::Parser;
use gproxy_a2a::{AgentCardConfig, InMemoryDeliveryLog, PushDispatcher, TaskEngine, TaskEngineConfig};
use gproxy_core::dispatcher::{Dispatcher, DispatcherConfig};
use gproxy_core::handler::{AppState, build_router};
use gproxy_core::quota::{QuotaAdmission, QuotaLimits};
use gproxy_core::auth::CredentialCache;
use gproxy_provider_impl::ProviderRegistry;
use gproxy_router::{CircuitConfig, CircuitRegistry, Router};
use gproxy_storage::{
    EnvSecretStore, InMemoryCredentialRepository, InMemoryMetricsSink, InMemoryTraceRepository, InMemoryUsageRepository,
    TraceSinkBridge, UsageSinkBridge,
};
use tracing_subscriber::EnvFilter;

use crate::a2a_http::A2aState;
use crate::dispatch_bridge::GatewayTaskDispatch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = cli::CliArgs::parse();
    let global = cli.global_config().context("assembling global config")?;

    let secrets = EnvSecretStore;
    let gateway = gateway_config::load(&cli.config, &secrets).context("loading gateway config")?;

    let credential_repository = Arc::new(InMemoryCredentialRepository::new());
    gateway.register_tenants(&credential_repository);
    let auth = Arc::new(CredentialCache::new(credential_repository, Duration::from_secs(300)));

    let provider_registry = Arc::new(ProviderRegistry::build(&gateway.provider_configs));
    let aliases = Arc::new(gateway.build_alias_table(&provider_registry));

    let circuits = Arc::new(CircuitRegistry::new(CircuitConfig::default()));
    let router = Arc::new(Router::new(aliases.clone(), circuits.clone(), global.dispatch_budget));

    let quota = Arc::new(QuotaAdmission::new(QuotaLimits::default()));

    let usage_repository = Arc::new(InMemoryUsageRepository::default());
    let usage_sink = Arc::new(UsageSinkBridge::new(usage_repository.clone(), quota.clone()));
    let trace_repository = Arc::new(InMemoryTraceRepository::new());
    let trace_sink = Arc::new(TraceSinkBridge::new(trace_repository.clone()));
    let metrics_sink = Arc::new(InMemoryMetricsSink::new());

    let dispatcher_config = DispatcherConfig {
        per_attempt_cap: Duration::from_millis(global.per_attempt_cap_ms),
        stream_idle_cap: Duration::from_millis(global.stream_idle_cap_ms),
        ..DispatcherConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(
        router,
        circuits,
        provider_registry,
        usage_sink,
        trace_sink,
        Arc::new(gproxy_provider_core::CostTable::default()),
        dispatcher_config,
    ));

    let app_state = Arc::new(AppState {
        auth: auth.clone(),
        quota,
        dispatcher: dispatcher.clone(),
        aliases,
        request_deadline: Duration::from_millis(global.per_attempt_cap_ms),
    });

    let push_signing_secret: Arc<[u8]> = Arc::from(
        std::env::var("GPROXY_PUSH_SIGNING_SECRET")
            .unwrap_or_else(|_| "change-me-push-signing-secret".to_string())
            .into_bytes()
            .into_boxed_slice(),
    );
    let push_client = reqwest::Client::builder().build().context("building push delivery client")?;
    let push_delivery_log = Arc::new(InMemoryDeliveryLog::new());
    let push = Arc::new(PushDispatcher::new(4, push_signing_secret, push_client, push_delivery_log));

    let task_dispatch = Arc::new(GatewayTaskDispatch::new(
        dispatcher,
        "default".to_string(),
        Duration::from_millis(global.per_attempt_cap_ms),
    ));
    let task_engine = Arc::new(TaskEngine::new(task_dispatch, push, TaskEngineConfig::default()));

    let agent_card = AgentCardConfig {
        name: "gproxy".to_string(),
        description: "Unified multi-tenant AI provider gateway".to_string(),
        url: format!("http://{}:{}", global.host, global.port),
        version: env!("CARGO_PKG_VERSION").to_string(),
        skills: Vec::new(),
    };
    let a2a_state = Arc::new(A2aState {
        engine: task_engine,
        auth,
        agent_card,
    });

    let app = build_router(app_state)
        .route("/a2a", axum::routing::post(a2a_http::a2a_rpc).with_state(a2a_state.clone()))
        .route("/.well-known/agent.json", get(a2a_http::agent_card).with_state(a2a_state))
        .route("/metrics", get(metrics_route::metrics).with_state(metrics_sink));

    let bind = format!("{}:{}", global.host, global.port);
    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "gproxy listening");
    axum::serve(listener, app).await?;
    Ok(())
}
