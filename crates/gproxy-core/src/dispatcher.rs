//! The Dispatcher (§4.5): the retry/failover state machine sitting between
//! the Router's ordered `[]Candidate` and the caller's own HTTP response.
//!
//! States: `Ready -> Attempting -> {Succeeded, Streaming, Failed, Cancelled,
//! Exhausted}`. Attempts are sequential, never parallel, bounded by the
//! budget the Router already truncated its candidate list to. A streaming
//! attempt that has pushed at least one chunk is committed: no further
//! candidate is tried regardless of how the upstream connection ends
//! afterward.

use std::sync::Arc;
use std::time::Duration;

use gproxy_provider_core::candidate::{Attempt, AttemptOutcome, Candidate};
use gproxy_provider_core::context::{AttemptContext, CancelSignal};
use gproxy_provider_core::error::{ErrorKind, GatewayError};
use gproxy_provider_core::request::DispatchRequest;
use gproxy_provider_core::response::{NormalizedResponse, ProxyResponse, StreamBody};
use gproxy_provider_core::shape::ApiShape;
use gproxy_provider_core::sink::{TraceSink, UsageSink};
use gproxy_provider_core::trace::{TraceEvent, TraceEventKind};
use gproxy_provider_core::usage::{CostTable, UsageRecord, UsageStatus};
use gproxy_provider_core::{CircuitState, Provider};
use gproxy_provider_impl::ProviderRegistry;
use gproxy_router::{CircuitRegistry, RouteError, Router};
use gproxy_transform::bridge::{DEFAULT_CAPACITY, StreamingBridge};
use gproxy_transform::canonical::Response as CanonicalResponse;
use gproxy_transform::shape_io;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use time::OffsetDateTime;

/// Result of one `dispatch()` call: either the Dispatcher produced a
/// response (JSON or a committed stream), or it ran out of candidates or
/// hit a fatal/cancelled/deadline-exceeded outcome along the way.
pub type DispatcherOutcome = Result<ProxyResponse, GatewayError>;

/// Deadline-division knobs (§4.5 "per-attempt deadline = the request
/// deadline minus a safety margin, divided by remaining budget", §5
/// defaults).
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub per_attempt_cap: Duration,
    pub stream_idle_cap: Duration,
    pub safety_margin: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            per_attempt_cap: Duration::from_secs(30),
            stream_idle_cap: Duration::from_secs(120),
            safety_margin: Duration::from_millis(250),
        }
    }
}

pub struct Dispatcher {
    router: Arc<Router>,
    circuits: Arc<CircuitRegistry>,
    providers: Arc<ProviderRegistry>,
    usage_sink: Arc<dyn UsageSink>,
    trace_sink: Arc<dyn TraceSink>,
    cost_table: Arc<CostTable>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        circuits: Arc<CircuitRegistry>,
        providers: Arc<ProviderRegistry>,
        usage_sink: Arc<dyn UsageSink>,
        trace_sink: Arc<dyn TraceSink>,
        cost_table: Arc<CostTable>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            router,
            circuits,
            providers,
            usage_sink,
            trace_sink,
            cost_table,
            config,
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest, cancel: CancelSignal) -> DispatcherOutcome {
        let mut seq = 0u64;
        let now = OffsetDateTime::now_utc();

        if request.is_expired(now) {
            return Err(GatewayError::new(ErrorKind::DeadlineExceeded, "deadline already elapsed"));
        }

        self.trace_sink
            .record_trace(TraceEvent::new(request.trace_id, seq, TraceEventKind::Accepted, now));
        seq += 1;

        let candidates = match self.router.resolve(&request.model_alias, request.api_shape, request.request_id, now) {
            Ok(candidates) => candidates,
            Err(RouteError::UnknownModel(alias)) => {
                return Err(GatewayError::new(ErrorKind::UnknownModel, format!("unknown model alias: {alias}")));
            }
            Err(RouteError::AllProvidersCoolingDown(alias)) => {
                return Err(GatewayError::new(
                    ErrorKind::AllProvidersCoolingDown,
                    format!("all providers cooling down for alias: {alias}"),
                ));
            }
        };

        self.trace_sink.record_trace(
            TraceEvent::new(request.trace_id, seq, TraceEventKind::Routed, now)
                .with_metadata("candidate_count", candidates.len().to_string()),
        );
        seq += 1;

        let mut route_log: Vec<ErrorKind> = Vec::new();
        let mut last_error_kind: Option<ErrorKind> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let now = OffsetDateTime::now_utc();
            if request.is_expired(now) {
                return Err(GatewayError::new(ErrorKind::DeadlineExceeded, "deadline elapsed before the next attempt")
                    .with_route_log(route_log));
            }
            if cancel.is_cancelled() {
                self.trace_sink
                    .record_trace(TraceEvent::new(request.trace_id, seq, TraceEventKind::Cancelled, now));
                return Err(GatewayError::new(ErrorKind::Cancelled, "request cancelled").with_route_log(route_log));
            }

            let Some(provider) = self.providers.get(&candidate.provider_id) else {
                route_log.push(ErrorKind::Internal);
                last_error_kind = Some(ErrorKind::Internal);
                tracing::warn!(provider_id = %candidate.provider_id, "candidate refers to an unconfigured provider");
                continue;
            };

            let health = self.circuits.snapshot(&candidate.provider_id, now);
            let needs_probe = health.state != CircuitState::Closed;
            if needs_probe && !self.circuits.try_acquire_probe(&candidate.provider_id, now) {
                continue;
            }

            let remaining_candidates = (candidates.len() - index) as u32;
            let attempt_cap = if request.stream {
                self.config.stream_idle_cap
            } else {
                self.config.per_attempt_cap
            };
            let share = attempt_share(request.deadline, now, remaining_candidates, attempt_cap, self.config.safety_margin);
            let attempt_deadline = now + share;

            let attempt_ctx = AttemptContext {
                trace_id: request.trace_id,
                request_id: request.request_id,
                attempt_index: index as u32,
                deadline: attempt_deadline,
                cancel: cancel.clone(),
            };

            let mut attempt = Attempt::started(index as u32, candidate.clone(), now);
            self.trace_sink.record_trace(
                TraceEvent::new(request.trace_id, seq, TraceEventKind::AttemptStarted, now)
                    .with_metadata("provider_id", candidate.provider_id.clone()),
            );
            seq += 1;

            if request.stream {
                match self.attempt_streaming(&request, candidate, attempt_ctx, provider, &mut attempt, &mut seq).await {
                    StreamOutcome::Committed(response) => return Ok(response),
                    StreamOutcome::Retry(err) => {
                        route_log.push(err.kind);
                        last_error_kind = Some(err.kind);
                        continue;
                    }
                    StreamOutcome::Fatal(err) => {
                        route_log.push(err.kind);
                        self.trace_sink.record_trace(TraceEvent::new(
                            request.trace_id,
                            seq,
                            TraceEventKind::Failed,
                            OffsetDateTime::now_utc(),
                        ));
                        return Err(err.with_route_log(route_log));
                    }
                }
            } else {
                match tokio::time::timeout(
                    attempt_ctx.remaining(OffsetDateTime::now_utc()),
                    provider.execute(attempt_ctx.clone(), request.api_shape, &request.payload, &candidate.upstream_model),
                )
                .await
                {
                    Ok(Ok(normalized)) => {
                        let now = OffsetDateTime::now_utc();
                        attempt.tokens_in = normalized.tokens_in;
                        attempt.tokens_out = normalized.tokens_out;
                        attempt.upstream_status = Some(200);
                        attempt.cost_estimate =
                            self.estimate_cost(candidate, request.api_shape, normalized.tokens_in, normalized.tokens_out);
                        attempt.finish(now, AttemptOutcome::Success, None);
                        self.circuits.record_success(&candidate.provider_id, now);
                        self.emit_attempt_finished(&request, candidate, &attempt, &mut seq);
                        return self.render_json(&request, &normalized, now);
                    }
                    Ok(Err(err)) => {
                        let now = OffsetDateTime::now_utc();
                        let outcome = if err.kind.is_retryable() {
                            AttemptOutcome::RetryableFailure
                        } else {
                            AttemptOutcome::FatalFailure
                        };
                        attempt.upstream_status = Some(err.kind.http_status().as_u16());
                        attempt.finish(now, outcome, Some(err.kind));
                        self.emit_attempt_finished(&request, candidate, &attempt, &mut seq);
                        if err.kind.is_retryable() {
                            self.circuits.record_failure(&candidate.provider_id, now);
                            route_log.push(err.kind);
                            last_error_kind = Some(err.kind);
                            continue;
                        }
                        self.trace_sink
                            .record_trace(TraceEvent::new(request.trace_id, seq, TraceEventKind::Failed, now));
                        route_log.push(err.kind);
                        return Err(err.with_route_log(route_log));
                    }
                    Err(_elapsed) => {
                        let now = OffsetDateTime::now_utc();
                        attempt.finish(now, AttemptOutcome::RetryableFailure, Some(ErrorKind::UpstreamTransient));
                        self.emit_attempt_finished(&request, candidate, &attempt, &mut seq);
                        self.circuits.record_failure(&candidate.provider_id, now);
                        route_log.push(ErrorKind::UpstreamTransient);
                        last_error_kind = Some(ErrorKind::UpstreamTransient);
                        continue;
                    }
                }
            }
        }

        let now = OffsetDateTime::now_utc();
        self.trace_sink
            .record_trace(TraceEvent::new(request.trace_id, seq, TraceEventKind::Failed, now));
        let kind = last_error_kind.unwrap_or(ErrorKind::AllProvidersCoolingDown);
        Err(GatewayError::new(kind, "dispatch exhausted every candidate").with_route_log(route_log))
    }

    /// Images/transcriptions carry no token usage, so they're costed by a
    /// flat per-operation rate instead of the per-token table (cost-model
    /// Open Question resolution, DESIGN.md).
    fn estimate_cost(&self, candidate: &Candidate, api_shape: ApiShape, tokens_in: u32, tokens_out: u32) -> f64 {
        match api_shape {
            ApiShape::Images => self.cost_table.estimate_flat("images"),
            ApiShape::Transcriptions => self.cost_table.estimate_flat("audio_transcriptions"),
            _ => self.cost_table.estimate_tokens(&candidate.provider_id, &candidate.upstream_model, tokens_in, tokens_out),
        }
    }

    fn render_json(&self, request: &DispatchRequest, normalized: &NormalizedResponse, now: OffsetDateTime) -> DispatcherOutcome {
        // Embeddings/Images/Transcriptions never go through the canonical
        // hub (§4.6 step 1 only applies to the four cross-transformed
        // shapes) — the adapter's `NormalizedResponse::content` is already
        // the OpenAI wire body, so it's returned as-is.
        let rendered = match request.api_shape {
            ApiShape::Embeddings | ApiShape::Images | ApiShape::Transcriptions => normalized.content.clone(),
            _ => {
                let canonical: CanonicalResponse = serde_json::from_value(normalized.content.clone())
                    .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("normalized response decode: {err}")))?;
                shape_io::encode_response(request.api_shape, &canonical, &request.request_id.to_string(), now.unix_timestamp())?
            }
        };
        let body = serde_json::to_vec(&rendered)
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("response encode: {err}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(ProxyResponse::Json {
            status: StatusCode::OK,
            headers,
            body: body.into(),
        })
    }

    /// Runs one streaming attempt to its commit point. Spawns the adapter's
    /// `executeStreaming` future immediately and races it against the
    /// bridge's commit signal: whichever fires first decides whether this
    /// candidate is retryable (no chunk ever reached the caller) or
    /// committed (at least one chunk did, per §4.5 "no retry after any
    /// chunk sent").
    async fn attempt_streaming(
        &self,
        request: &DispatchRequest,
        candidate: &Candidate,
        attempt_ctx: AttemptContext,
        provider: Arc<dyn Provider>,
        attempt: &mut Attempt,
        seq: &mut u64,
    ) -> StreamOutcome {
        let (bridge, receiver) = StreamingBridge::new(DEFAULT_CAPACITY, attempt_ctx.cancel.clone());
        let bridge = Arc::new(bridge);
        let commit_signal = bridge.commit_signal();

        // Subscribe to the commit notification *before* spawning the
        // adapter task: `Notify::notify_waiters` only wakes listeners
        // already registered at the time it's called, so registering after
        // the spawn would risk losing a notification fired by a fast
        // adapter (one push then an immediate return) before this task
        // ever polls it.
        let committed = commit_signal.notified();
        tokio::pin!(committed);

        let payload = request.payload.clone();
        let upstream_model = candidate.upstream_model.clone();
        let api_shape = request.api_shape;
        let exec_bridge = bridge.clone();
        let exec_provider = provider.clone();
        let exec_ctx = attempt_ctx.clone();
        let mut handle = tokio::spawn(async move {
            exec_provider
                .execute_streaming(exec_ctx, api_shape, &payload, &upstream_model, exec_bridge.as_ref())
                .await
        });

        tokio::select! {
            _ = &mut committed => {
                let usage_sink = self.usage_sink.clone();
                let trace_sink = self.trace_sink.clone();
                let circuits = self.circuits.clone();
                let cost_table = self.cost_table.clone();
                let finish_candidate = candidate.clone();
                let finish_request_id = request.request_id;
                let finish_trace_id = request.trace_id;
                let finish_api_shape = request.api_shape;
                let finish_alias = request.model_alias.clone();
                let mut finish_attempt = attempt.clone();
                let finish_bridge = bridge.clone();
                let finish_seq = *seq;
                tokio::spawn(async move {
                    let result = handle.await;
                    let now = OffsetDateTime::now_utc();
                    let metrics = finish_bridge.snapshot_metrics().await;
                    finish_attempt.bytes_streamed = metrics.chunk_count as u64;
                    let (outcome, error_kind) = match result {
                        Ok(Ok(())) => (AttemptOutcome::Success, None),
                        Ok(Err(err)) if err.kind == ErrorKind::Cancelled => (AttemptOutcome::Cancelled, Some(err.kind)),
                        Ok(Err(err)) => (AttemptOutcome::RetryableFailure, Some(err.kind)),
                        Err(_join_err) => (AttemptOutcome::FatalFailure, Some(ErrorKind::Internal)),
                    };
                    if matches!(outcome, AttemptOutcome::Success) {
                        circuits.record_success(&finish_candidate.provider_id, now);
                    } else if matches!(outcome, AttemptOutcome::RetryableFailure) {
                        circuits.record_failure(&finish_candidate.provider_id, now);
                    }
                    finish_attempt.finish(now, outcome, error_kind);
                    trace_sink.record_trace(
                        TraceEvent::new(finish_trace_id, finish_seq, TraceEventKind::AttemptFinished, now)
                            .with_metadata("provider_id", finish_candidate.provider_id.clone()),
                    );
                    let latency_ms = (now - finish_attempt.started_at).whole_milliseconds().max(0) as u64;
                    usage_sink.record_usage(UsageRecord {
                        request_id: finish_request_id,
                        trace_id: finish_trace_id,
                        api_shape: finish_api_shape,
                        alias_model: finish_alias,
                        upstream_provider: finish_candidate.provider_id.clone(),
                        upstream_model: finish_candidate.upstream_model.clone(),
                        status: UsageStatus::from(outcome),
                        latency_ms,
                        tokens_in: finish_attempt.tokens_in,
                        tokens_out: finish_attempt.tokens_out,
                        cost_estimate: cost_table.estimate_tokens(
                            &finish_candidate.provider_id,
                            &finish_candidate.upstream_model,
                            finish_attempt.tokens_in,
                            finish_attempt.tokens_out,
                        ),
                        principal_ref: None,
                        attempt_index: finish_attempt.attempt_index,
                        retry_count: finish_attempt.attempt_index,
                    });
                });

                let now = OffsetDateTime::now_utc();
                let mut headers = HeaderMap::new();
                headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
                let stream = receiver.into_sse_stream(
                    request.api_shape,
                    request.request_id.to_string(),
                    candidate.upstream_model.clone(),
                    now.unix_timestamp(),
                );
                StreamOutcome::Committed(ProxyResponse::Stream {
                    status: StatusCode::OK,
                    headers,
                    body: StreamBody::new("text/event-stream", stream),
                })
            }
            joined = &mut handle => {
                // Nothing ever reached the caller: still free to retry the
                // next candidate on failure, or return a (necessarily
                // empty) clean stream on a vacuous success.
                let now = OffsetDateTime::now_utc();
                match joined {
                    Ok(Ok(())) => {
                        attempt.finish(now, AttemptOutcome::Success, None);
                        self.circuits.record_success(&candidate.provider_id, now);
                        self.emit_attempt_finished(request, candidate, attempt, seq);
                        let mut headers = HeaderMap::new();
                        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                        let stream = receiver.into_sse_stream(
                            request.api_shape,
                            request.request_id.to_string(),
                            candidate.upstream_model.clone(),
                            now.unix_timestamp(),
                        );
                        StreamOutcome::Committed(ProxyResponse::Stream {
                            status: StatusCode::OK,
                            headers,
                            body: StreamBody::new("text/event-stream", stream),
                        })
                    }
                    Ok(Err(err)) => {
                        let outcome = if err.kind.is_retryable() { AttemptOutcome::RetryableFailure } else { AttemptOutcome::FatalFailure };
                        attempt.finish(now, outcome, Some(err.kind));
                        self.emit_attempt_finished(request, candidate, attempt, seq);
                        if err.kind.is_retryable() {
                            self.circuits.record_failure(&candidate.provider_id, now);
                            StreamOutcome::Retry(err)
                        } else {
                            StreamOutcome::Fatal(err)
                        }
                    }
                    Err(_join_err) => {
                        let err = GatewayError::new(ErrorKind::Internal, "streaming adapter task panicked");
                        attempt.finish(now, AttemptOutcome::FatalFailure, Some(err.kind));
                        self.emit_attempt_finished(request, candidate, attempt, seq);
                        StreamOutcome::Fatal(err)
                    }
                }
            }
        }
    }

    fn emit_attempt_finished(&self, request: &DispatchRequest, candidate: &Candidate, attempt: &Attempt, seq: &mut u64) {
        let now = attempt.finished_at.unwrap_or_else(OffsetDateTime::now_utc);
        self.trace_sink.record_trace(
            TraceEvent::new(request.trace_id, *seq, TraceEventKind::AttemptFinished, now)
                .with_metadata("provider_id", candidate.provider_id.clone()),
        );
        *seq += 1;

        let latency_ms = (now - attempt.started_at).whole_milliseconds().max(0) as u64;
        self.usage_sink.record_usage(UsageRecord {
            request_id: request.request_id,
            trace_id: request.trace_id,
            api_shape: request.api_shape,
            alias_model: request.model_alias.clone(),
            upstream_provider: candidate.provider_id.clone(),
            upstream_model: candidate.upstream_model.clone(),
            status: attempt.outcome.map(UsageStatus::from).unwrap_or(UsageStatus::FatalFailure),
            latency_ms,
            tokens_in: attempt.tokens_in,
            tokens_out: attempt.tokens_out,
            cost_estimate: attempt.cost_estimate,
            principal_ref: Some(request.principal.clone()),
            attempt_index: attempt.attempt_index,
            retry_count: attempt.attempt_index,
        });
    }
}

enum StreamOutcome {
    Committed(ProxyResponse),
    Retry(GatewayError),
    Fatal(GatewayError),
}

fn attempt_share(
    deadline: OffsetDateTime,
    now: OffsetDateTime,
    remaining_candidates: u32,
    per_attempt_cap: Duration,
    safety_margin: Duration,
) -> Duration {
    let total_remaining = deadline - now;
    if total_remaining.is_negative() {
        return Duration::ZERO;
    }
    let total_remaining = total_remaining.unsigned_abs().saturating_sub(safety_margin);
    let share = total_remaining / remaining_candidates.max(1);
    share.min(per_attempt_cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn attempt_share_divides_remaining_time_across_remaining_candidates() {
        let deadline = now() + Duration::from_secs(10);
        let share = attempt_share(deadline, now(), 2, Duration::from_secs(30), Duration::from_millis(0));
        assert_eq!(share, Duration::from_secs(5));
    }

    #[test]
    fn attempt_share_is_capped_at_the_per_attempt_cap() {
        let deadline = now() + Duration::from_secs(100);
        let share = attempt_share(deadline, now(), 1, Duration::from_secs(30), Duration::from_millis(0));
        assert_eq!(share, Duration::from_secs(30));
    }

    #[test]
    fn attempt_share_is_zero_once_the_deadline_has_passed() {
        let deadline = now() - Duration::from_secs(1);
        let share = attempt_share(deadline, now(), 1, Duration::from_secs(30), Duration::from_millis(0));
        assert_eq!(share, Duration::ZERO);
    }

    // --- End-to-end state-machine tests (§8 S1-S4) against a mock Provider ---
    // (§4.6/§9: "concrete variants are OpenAI, Anthropic, Gemini, and a mock
    // used in tests").

    mod state_machine {
        use std::collections::HashMap;
        use std::sync::Mutex as StdMutex;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use async_trait::async_trait;
        use futures_util::StreamExt;
        use gproxy_provider_core::provider::ProviderProbe;
        use gproxy_provider_core::stream_chunk::StreamChunk;
        use gproxy_provider_core::{Principal, PrincipalKind, PrincipalRef};
        use gproxy_router::{AliasTable, CircuitConfig, ProviderCapabilities};
        use gproxy_transform::canonical::{Part as CanonicalPart, Usage as CanonicalUsage};
        use serde_json::Value;

        use super::*;

        #[derive(Clone)]
        enum MockBehavior {
            Success { tokens_in: u32, tokens_out: u32 },
            Fail(ErrorKind),
            StreamCommitThenFail,
        }

        /// The spec's §4.6/§9 "mock used in tests" `Provider` variant: a
        /// scripted adapter that plays back one behavior per call, in order,
        /// so a test can assert exactly how many attempts a candidate saw.
        struct MockProvider {
            calls: AtomicUsize,
            behaviors: Vec<MockBehavior>,
        }

        impl MockProvider {
            fn new(behaviors: Vec<MockBehavior>) -> Self {
                Self {
                    calls: AtomicUsize::new(0),
                    behaviors,
                }
            }

            fn calls(&self) -> usize {
                self.calls.load(Ordering::SeqCst)
            }
        }

        #[async_trait]
        impl Provider for MockProvider {
            fn name(&self) -> &str {
                "mock"
            }

            fn supported_shapes(&self) -> &[ApiShape] {
                const SHAPES: [ApiShape; 1] = [ApiShape::Chat];
                &SHAPES
            }

            async fn execute(
                &self,
                _ctx: AttemptContext,
                _source_shape: ApiShape,
                _payload: &Value,
                upstream_model: &str,
            ) -> Result<NormalizedResponse, GatewayError> {
                let index = self.calls.fetch_add(1, Ordering::SeqCst);
                match self.behaviors[index].clone() {
                    MockBehavior::Success { tokens_in, tokens_out } => {
                        let canonical = CanonicalResponse {
                            model: upstream_model.to_string(),
                            parts: vec![CanonicalPart::Text("Hello".to_string())],
                            finish_reason: Some("stop".to_string()),
                            usage: CanonicalUsage {
                                input_tokens: tokens_in,
                                output_tokens: tokens_out,
                            },
                        };
                        Ok(NormalizedResponse {
                            upstream_model: upstream_model.to_string(),
                            content: serde_json::to_value(canonical).unwrap(),
                            finish_reason: Some("stop".to_string()),
                            tokens_in,
                            tokens_out,
                        })
                    }
                    MockBehavior::Fail(kind) => Err(GatewayError::new(kind, "mock upstream failure")),
                    MockBehavior::StreamCommitThenFail => panic!("non-streaming call hit a streaming-only behavior"),
                }
            }

            async fn execute_streaming(
                &self,
                _ctx: AttemptContext,
                _source_shape: ApiShape,
                _payload: &Value,
                _upstream_model: &str,
                sink: &(dyn gproxy_provider_core::StreamSink + Send + Sync),
            ) -> Result<(), GatewayError> {
                let index = self.calls.fetch_add(1, Ordering::SeqCst);
                match self.behaviors[index].clone() {
                    MockBehavior::StreamCommitThenFail => {
                        sink.push(StreamChunk::TextDelta("partial".to_string())).await?;
                        Err(GatewayError::new(ErrorKind::UpstreamTransient, "connection reset mid-stream"))
                    }
                    _ => panic!("streaming call hit a non-streaming behavior"),
                }
            }

            async fn probe(&self, _ctx: AttemptContext) -> ProviderProbe {
                ProviderProbe::Healthy
            }
        }

        #[derive(Default)]
        struct RecordingSinks {
            usage: StdMutex<Vec<UsageRecord>>,
            trace: StdMutex<Vec<TraceEvent>>,
        }

        impl UsageSink for RecordingSinks {
            fn record_usage(&self, record: UsageRecord) {
                self.usage.lock().unwrap().push(record);
            }
        }

        impl TraceSink for RecordingSinks {
            fn record_trace(&self, event: TraceEvent) {
                self.trace.lock().unwrap().push(event);
            }
        }

        fn test_principal() -> PrincipalRef {
            Arc::new(Principal {
                kind: PrincipalKind::ApiKey,
                id: "p1".to_string(),
                scope_tags: Default::default(),
                roles: Default::default(),
            })
        }

        fn chat_request(deadline: OffsetDateTime, stream: bool) -> DispatchRequest {
            DispatchRequest {
                api_shape: ApiShape::Chat,
                model_alias: "gpt-4o-mini".to_string(),
                payload: serde_json::json!({
                    "model": "gpt-4o-mini",
                    "messages": [{"role": "user", "content": "Hi"}],
                }),
                stream,
                principal: test_principal(),
                trace_id: 1,
                request_id: 1,
                deadline,
                metadata: Default::default(),
            }
        }

        fn build_dispatcher(
            providers: HashMap<String, Arc<dyn Provider>>,
            candidates: Vec<Candidate>,
            budget: u32,
        ) -> (Dispatcher, Arc<RecordingSinks>, Arc<CircuitRegistry>) {
            let mut aliases = AliasTable::new();
            for candidate in &candidates {
                aliases.insert_capabilities(ProviderCapabilities {
                    provider_id: candidate.provider_id.clone(),
                    supported_shapes: vec![ApiShape::Chat],
                });
            }
            aliases.insert_alias("gpt-4o-mini", candidates);
            let circuits = Arc::new(CircuitRegistry::new(CircuitConfig::default()));
            let router = Arc::new(Router::new(Arc::new(aliases), circuits.clone(), budget));
            let registry = Arc::new(ProviderRegistry::from_providers(providers));
            let sinks = Arc::new(RecordingSinks::default());
            let dispatcher = Dispatcher::new(
                router,
                circuits.clone(),
                registry,
                sinks.clone(),
                sinks.clone(),
                Arc::new(CostTable::new()),
                DispatcherConfig::default(),
            );
            (dispatcher, sinks, circuits)
        }

        // S1 — single-shot success (§8 scenario S1).
        #[tokio::test]
        async fn single_shot_success_records_one_attempt_and_usage() {
            let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(vec![MockBehavior::Success { tokens_in: 9, tokens_out: 1 }]));
            let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
            providers.insert("openai".to_string(), provider);
            let candidates = vec![Candidate::new("openai", "gpt-4o-mini", 100)];
            let (dispatcher, sinks, _circuits) = build_dispatcher(providers, candidates, 2);

            let request = chat_request(now() + Duration::from_secs(30), false);
            let response = dispatcher.dispatch(request, CancelSignal::new()).await.unwrap();
            let ProxyResponse::Json { body, .. } = response else {
                panic!("expected a json response");
            };
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["choices"][0]["message"]["content"], "Hello");

            let usage = sinks.usage.lock().unwrap();
            assert_eq!(usage.len(), 1);
            assert_eq!(usage[0].tokens_in, 9);
            assert_eq!(usage[0].tokens_out, 1);
            assert_eq!(usage[0].status, UsageStatus::Success);
        }

        // S2 — failover to the next candidate after a retryable failure.
        #[tokio::test]
        async fn failover_retries_next_candidate_after_retryable_failure() {
            let provider_a: Arc<dyn Provider> = Arc::new(MockProvider::new(vec![MockBehavior::Fail(ErrorKind::UpstreamTransient)]));
            let provider_b: Arc<dyn Provider> = Arc::new(MockProvider::new(vec![MockBehavior::Success { tokens_in: 5, tokens_out: 2 }]));
            let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
            providers.insert("a".to_string(), provider_a);
            providers.insert("b".to_string(), provider_b);
            let candidates = vec![Candidate::new("a", "m", 100), Candidate::new("b", "m", 80)];
            let (dispatcher, sinks, circuits) = build_dispatcher(providers, candidates, 2);

            let request = chat_request(now() + Duration::from_secs(30), false);
            let response = dispatcher.dispatch(request, CancelSignal::new()).await.unwrap();
            assert!(matches!(response, ProxyResponse::Json { .. }));

            let usage = sinks.usage.lock().unwrap();
            assert_eq!(usage.len(), 2);
            assert_eq!(usage[0].upstream_provider, "a");
            assert_eq!(usage[0].status, UsageStatus::RetryableFailure);
            assert_eq!(usage[1].upstream_provider, "b");
            assert_eq!(usage[1].status, UsageStatus::Success);

            let health = circuits.snapshot("a", now());
            assert_eq!(health.consecutive_failures, 1);
        }

        // S3 — budget exhaustion: exactly `B` attempts, later candidates untouched.
        #[tokio::test]
        async fn budget_exhaustion_stops_at_the_configured_attempt_budget() {
            let provider_a = Arc::new(MockProvider::new(vec![MockBehavior::Fail(ErrorKind::UpstreamTransient)]));
            let provider_b = Arc::new(MockProvider::new(vec![MockBehavior::Fail(ErrorKind::UpstreamTransient)]));
            let provider_c = Arc::new(MockProvider::new(vec![MockBehavior::Fail(ErrorKind::UpstreamTransient)]));
            let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
            providers.insert("a".to_string(), provider_a.clone());
            providers.insert("b".to_string(), provider_b.clone());
            providers.insert("c".to_string(), provider_c.clone());
            let candidates = vec![
                Candidate::new("a", "m", 100),
                Candidate::new("b", "m", 90),
                Candidate::new("c", "m", 80),
            ];
            let (dispatcher, sinks, _circuits) = build_dispatcher(providers, candidates, 2);

            let request = chat_request(now() + Duration::from_secs(30), false);
            let err = dispatcher.dispatch(request, CancelSignal::new()).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::UpstreamTransient);
            assert_eq!(err.route_log, vec![ErrorKind::UpstreamTransient, ErrorKind::UpstreamTransient]);

            assert_eq!(sinks.usage.lock().unwrap().len(), 2);
            assert_eq!(provider_a.calls(), 1);
            assert_eq!(provider_b.calls(), 1);
            assert_eq!(provider_c.calls(), 0, "budget exhausted before the third candidate is ever contacted");
        }

        // S4 / property 2 — streaming atomicity: one committed chunk is never
        // followed by a retry, and a silent (no `event: error`) stream close.
        #[tokio::test]
        async fn streaming_commit_after_first_chunk_suppresses_retry() {
            let provider_a = Arc::new(MockProvider::new(vec![MockBehavior::StreamCommitThenFail]));
            let provider_b = Arc::new(MockProvider::new(vec![MockBehavior::StreamCommitThenFail]));
            let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
            providers.insert("a".to_string(), provider_a.clone());
            providers.insert("b".to_string(), provider_b.clone());
            let candidates = vec![Candidate::new("a", "m", 100), Candidate::new("b", "m", 80)];
            let (dispatcher, sinks, _circuits) = build_dispatcher(providers, candidates, 2);

            let request = chat_request(now() + Duration::from_secs(30), true);
            let response = dispatcher.dispatch(request, CancelSignal::new()).await.unwrap();
            let ProxyResponse::Stream { body, .. } = response else {
                panic!("expected a streamed response");
            };
            let chunks: Vec<_> = body.stream.collect().await;
            let text = chunks
                .into_iter()
                .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
                .collect::<String>();

            assert!(text.contains("partial"), "the committed chunk must reach the caller: {text}");
            assert!(!text.contains("event: error"), "a committed stream closes silently, not with an error event");
            assert_eq!(provider_a.calls(), 1);
            assert_eq!(provider_b.calls(), 0, "no retry is attempted once a chunk has committed the attempt");

            // The finishing bookkeeping task runs after the response is
            // handed back; give it a beat to land before asserting on it.
            tokio::time::sleep(Duration::from_millis(20)).await;
            let usage = sinks.usage.lock().unwrap();
            assert_eq!(usage.len(), 1);
            assert_eq!(usage[0].upstream_provider, "a");
        }

        // Boundary: a deadline already in the past consumes zero attempts.
        #[tokio::test]
        async fn deadline_already_elapsed_fails_without_any_attempt() {
            let providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
            let candidates = vec![Candidate::new("a", "m", 100)];
            let (dispatcher, sinks, _circuits) = build_dispatcher(providers, candidates, 2);

            let request = chat_request(now() - Duration::from_secs(1), false);
            let err = dispatcher.dispatch(request, CancelSignal::new()).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
            assert!(sinks.usage.lock().unwrap().is_empty());
        }
    }
}
