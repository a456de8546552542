use async_trait::async_trait;
use serde_json::Value;

use crate::context::AttemptContext;
use crate::error::GatewayError;
use crate::response::NormalizedResponse;
use crate::shape::ApiShape;
use crate::stream_chunk::StreamChunk;

/// Health reported by an adapter's `probe()`, consumed by the Circuit
/// component's half-open probe gate (§4.6, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderProbe {
    Healthy,
    Degraded,
    Down,
}

/// Sink an adapter writes vendor-agnostic streaming chunks to; the
/// Streaming Bridge (`gproxy-transform::bridge`) is the concrete
/// implementation that applies back-pressure and flush-on-event semantics
/// (§4.7) and renders each `StreamChunk` into the caller's own `apiShape`.
/// Adapters only see this narrow trait so they stay ignorant of both the
/// bridge's internals and which `apiShape` the caller asked for.
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Push one vendor-agnostic chunk. Resolves once the bridge has
    /// accepted it into the back-pressure channel; back-pressure is
    /// realized by this call simply not returning until there is room.
    async fn push(&self, chunk: StreamChunk) -> Result<(), GatewayError>;

    /// Signal clean end-of-stream (the bridge emits the shape's terminal
    /// sentinel itself — `[DONE]` or a final `finishReason` chunk).
    async fn finish(&self);
}

/// The vendor-polymorphic Provider Adapter contract (§4.6): "a capability
/// set `{execute, executeStreaming, probe, name, supportedShapes}`" per §9.
/// Implementations must be stateless across calls and safe for concurrent
/// use.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn supported_shapes(&self) -> &[ApiShape];

    /// `source_shape` is the caller's own `apiShape`, not necessarily one
    /// this adapter's vendor speaks natively — a `messages`-shaped call can
    /// land on the OpenAI adapter when an alias routes across vendors. The
    /// adapter is responsible for going through the canonical hub whenever
    /// `source_shape` isn't its native shape (§4.6 step 1).
    async fn execute(
        &self,
        ctx: AttemptContext,
        source_shape: ApiShape,
        payload: &Value,
        upstream_model: &str,
    ) -> Result<NormalizedResponse, GatewayError>;

    async fn execute_streaming(
        &self,
        ctx: AttemptContext,
        source_shape: ApiShape,
        payload: &Value,
        upstream_model: &str,
        sink: &(dyn StreamSink + Send + Sync),
    ) -> Result<(), GatewayError>;

    async fn probe(&self, ctx: AttemptContext) -> ProviderProbe;
}
