//! Streaming Bridge (§4.7): the back-pressured relay between a Provider
//! Adapter's `executeStreaming` and the caller's own HTTP response.
//!
//! The adapter only sees the narrow `StreamSink` half (`StreamingBridge`)
//! and pushes vendor-agnostic `StreamChunk`s; it never learns which
//! `apiShape` the caller asked for. The `BridgeReceiver` half is consumed by
//! the handler once the Dispatcher has committed to an attempt, and renders
//! each chunk through `openai`/`claude`/`gemini`'s `encode_chunk_event`.

use std::pin::Pin;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use gproxy_protocol::sse::{SseEvent, format_event};
use gproxy_provider_core::context::CancelSignal;
use gproxy_provider_core::{ApiShape, ErrorKind, GatewayError, StreamChunk, StreamSink};
use tokio::sync::{Mutex, Notify, mpsc};

use crate::{claude, gemini, openai};

/// §4.7: "a bounded channel, default 64 events deep".
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamMetrics {
    pub chunk_count: u32,
    pub time_to_first_chunk: Option<Duration>,
    pub max_inter_chunk_gap: Duration,
}

struct MetricsState {
    started_at: Instant,
    last_chunk_at: Option<Instant>,
    metrics: StreamMetrics,
}

/// Adapter-facing half of the bridge. Implements `StreamSink`; every
/// `push()` also updates the TTFC / inter-chunk-gap metrics the Dispatcher
/// attaches to the completing `Attempt` (§4.7, §3 `Attempt`).
pub struct StreamingBridge {
    tx: mpsc::Sender<StreamChunk>,
    cancel: CancelSignal,
    metrics: std::sync::Arc<Mutex<MetricsState>>,
    committed: std::sync::Arc<Notify>,
}

impl StreamingBridge {
    /// Builds a connected pair: the `StreamSink` half an adapter writes
    /// into, and the `BridgeReceiver` half the handler renders from.
    pub fn new(capacity: usize, cancel: CancelSignal) -> (Self, BridgeReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let metrics = std::sync::Arc::new(Mutex::new(MetricsState {
            started_at: Instant::now(),
            last_chunk_at: None,
            metrics: StreamMetrics::default(),
        }));
        (
            Self {
                tx,
                cancel,
                metrics: metrics.clone(),
                committed: std::sync::Arc::new(Notify::new()),
            },
            BridgeReceiver { rx, metrics },
        )
    }

    /// Metrics observed so far; read by the Dispatcher once the attempt
    /// finishes (successfully or not) to fill in `Attempt::finish`.
    pub async fn snapshot_metrics(&self) -> StreamMetrics {
        self.metrics.lock().await.metrics
    }

    /// A handle the Dispatcher races against the `executeStreaming` future
    /// itself (§4.5: "the first successful chunk commits the attempt").
    /// Fires on every push; the Dispatcher must start waiting on it before
    /// spawning the attempt so it can't miss the first notification.
    pub fn commit_signal(&self) -> std::sync::Arc<Notify> {
        self.committed.clone()
    }
}

#[async_trait]
impl StreamSink for StreamingBridge {
    async fn push(&self, chunk: StreamChunk) -> Result<(), GatewayError> {
        if self.cancel.is_cancelled() {
            return Err(GatewayError::new(ErrorKind::Cancelled, "downstream disconnected"));
        }

        {
            let mut state = self.metrics.lock().await;
            let now = Instant::now();
            if state.metrics.time_to_first_chunk.is_none() {
                state.metrics.time_to_first_chunk = Some(now.saturating_duration_since(state.started_at));
            }
            if let Some(last) = state.last_chunk_at {
                let gap = now.saturating_duration_since(last);
                if gap > state.metrics.max_inter_chunk_gap {
                    state.metrics.max_inter_chunk_gap = gap;
                }
            }
            state.last_chunk_at = Some(now);
            state.metrics.chunk_count += 1;
        }
        self.committed.notify_waiters();

        self.tx
            .send(chunk)
            .await
            .map_err(|_| GatewayError::internal("stream receiver dropped"))
    }

    async fn finish(&self) {
        // Dropping our clone of the sender on return from `execute_streaming`
        // closes the channel; the receiver treats closure as normal
        // end-of-stream and emits the shape's terminal sentinel itself.
    }
}

/// Caller-facing half. Consumed once, via [`BridgeReceiver::into_sse_stream`],
/// into a `Stream<Item = Result<Bytes, io::Error>>` suitable for
/// `gproxy_provider_core::StreamBody`.
pub struct BridgeReceiver {
    rx: mpsc::Receiver<StreamChunk>,
    metrics: std::sync::Arc<Mutex<MetricsState>>,
}

impl BridgeReceiver {
    pub async fn metrics(&self) -> StreamMetrics {
        self.metrics.lock().await.metrics
    }

    /// Renders the channel's remaining chunks into an `apiShape`-specific
    /// SSE byte stream. `id`/`model`/`created` are the identifiers the
    /// caller's own wire shape expects on every chunk (OpenAI chunks repeat
    /// them; Gemini only needs `model`; Anthropic needs neither, just a
    /// running content-block index).
    pub fn into_sse_stream(
        self,
        shape: ApiShape,
        id: String,
        model: String,
        created: i64,
    ) -> Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>> {
        let state = RenderState {
            rx: self.rx,
            shape,
            id,
            model,
            created,
            index: 0,
            sent_any: false,
            done: false,
        };
        Box::pin(futures_util::stream::unfold(state, render_next))
    }
}

struct RenderState {
    rx: mpsc::Receiver<StreamChunk>,
    shape: ApiShape,
    id: String,
    model: String,
    created: i64,
    index: u32,
    sent_any: bool,
    done: bool,
}

async fn render_next(mut state: RenderState) -> Option<(Result<Bytes, std::io::Error>, RenderState)> {
    if state.done {
        return None;
    }

    match state.rx.recv().await {
        Some(chunk) => {
            let is_done = matches!(chunk, StreamChunk::Done { .. });
            let sse = render_chunk(&state, &chunk);
            let mut out = format_event(sse.event.as_deref(), &sse.data);

            if is_done {
                state.done = true;
                out.push_str(&terminal_sentinel(state.shape));
            } else {
                state.index += 1;
            }
            state.sent_any = true;

            Some((Ok(Bytes::from(out.into_bytes())), state))
        }
        None => {
            state.done = true;
            // §4.7: emit a terminal `event: error` only if nothing has
            // reached the client yet; otherwise the stream just ends (the
            // adapter should already have pushed a `Done` on every clean
            // path, so reaching here means the upstream connection dropped
            // mid-stream after partial output).
            if !state.sent_any {
                let sse = SseEvent {
                    event: Some("error".to_string()),
                    data: r#"{"error":{"message":"upstream stream ended without a response"}}"#.to_string(),
                };
                let out = format_event(sse.event.as_deref(), &sse.data);
                Some((Ok(Bytes::from(out.into_bytes())), state))
            } else {
                let out = terminal_sentinel(state.shape);
                if out.is_empty() {
                    None
                } else {
                    Some((Ok(Bytes::from(out.into_bytes())), state))
                }
            }
        }
    }
}

fn render_chunk(state: &RenderState, chunk: &StreamChunk) -> SseEvent {
    match state.shape {
        ApiShape::Chat | ApiShape::Responses => {
            openai::encode_chunk_event(chunk, &state.id, state.created, &state.model)
        }
        ApiShape::Messages => claude::encode_chunk_event(chunk, state.index),
        ApiShape::Gemini => gemini::encode_chunk_event(chunk, &state.model),
        // These shapes never stream (`ApiShape::supports_streaming` guards
        // at decode time); OpenAI framing is a harmless fallback rather
        // than an unreachable panic if one is ever pushed here regardless.
        ApiShape::Embeddings | ApiShape::Images | ApiShape::Transcriptions => {
            openai::encode_chunk_event(chunk, &state.id, state.created, &state.model)
        }
    }
}

fn terminal_sentinel(shape: ApiShape) -> String {
    match shape {
        ApiShape::Chat | ApiShape::Responses => format!("data: {}\n\n", openai::DONE_SENTINEL),
        ApiShape::Messages => format_event(Some(claude::MESSAGE_STOP_EVENT), "{}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gproxy_provider_core::context::CancelSignal;

    #[tokio::test]
    async fn push_then_drain_renders_openai_chunks() {
        let cancel = CancelSignal::new();
        let (bridge, receiver) = StreamingBridge::new(DEFAULT_CAPACITY, cancel);

        tokio::spawn(async move {
            bridge.push(StreamChunk::TextDelta("hi".to_string())).await.unwrap();
            bridge
                .push(StreamChunk::Done {
                    finish_reason: Some("stop".to_string()),
                    usage: None,
                })
                .await
                .unwrap();
            bridge.finish().await;
        });

        let mut stream = receiver.into_sse_stream(ApiShape::Chat, "resp-1".into(), "gpt-test".into(), 0);
        let mut collected = Vec::new();
        while let Some(chunk) = futures_util::StreamExt::next(&mut stream).await {
            collected.push(chunk.unwrap());
        }
        let text = String::from_utf8(collected.concat()).unwrap();
        assert!(text.contains("\"content\":\"hi\""));
        assert!(text.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn cancelled_sink_rejects_pushes() {
        let cancel = CancelSignal::new();
        let (bridge, _receiver) = StreamingBridge::new(DEFAULT_CAPACITY, cancel.clone());
        cancel.cancel();
        let err = bridge.push(StreamChunk::TextDelta("x".into())).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
