//! `POST /a2a` and `GET /.well-known/agent.json` (§6): the HTTP envelope
//! around the §4.9 JSON-RPC method table. Kept in `apps/gproxy` rather than
//! `gproxy-core`/`gproxy-a2a` since it needs both `gproxy-a2a::rpc` and an
//! axum `State`, and DESIGN.md's `gproxy-core` entry already explains why
//! A2A routes don't belong in that crate.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gproxy_a2a::rpc::{self, JsonRpcRequest, JsonRpcResponse, METHOD_MESSAGE_STREAM, METHOD_TASKS_RESUBSCRIBE};
use gproxy_a2a::{agent_card::build_agent_card, AgentCardConfig, TaskEngine};
use gproxy_core::auth::CredentialCache;
use gproxy_protocol::sse::format_event;
use gproxy_provider_core::error::{ErrorKind, GatewayError};
use http::{HeaderMap, HeaderValue};
use tokio_stream::StreamExt;

pub struct A2aState {
    pub engine: Arc<TaskEngine>,
    pub auth: Arc<CredentialCache>,
    pub agent_card: AgentCardConfig,
}

pub async fn agent_card(State(state): State<Arc<A2aState>>) -> Response {
    Json(build_agent_card(&state.agent_card)).into_response()
}

pub async fn a2a_rpc(State(state): State<Arc<A2aState>>, headers: HeaderMap, Json(request): Json<JsonRpcRequest>) -> Response {
    if let Err(err) = state.auth.authenticate(&headers, false) {
        return rpc_error_response(request.id, &GatewayError::new(ErrorKind::Unauthenticated, err.to_string()));
    }

    if request.method == METHOD_MESSAGE_STREAM || request.method == METHOD_TASKS_RESUBSCRIBE {
        return stream_response(state, request).await;
    }

    let result = rpc::dispatch(&state.engine, &request.method, request.params, &state.agent_card).await;
    match result {
        Ok(value) => Json(JsonRpcResponse::success(request.id, value)).into_response(),
        Err(err) => rpc_error_response(request.id, &err),
    }
}

fn rpc_error_response(id: serde_json::Value, err: &GatewayError) -> Response {
    Json(JsonRpcResponse::failure(id, err)).into_response()
}

/// Renders the §4.9 `TaskEvent` stream as raw `text/event-stream` bytes,
/// the same manual framing `gproxy-core::handler::render_proxy_response`
/// uses for provider SSE passthrough rather than axum's own `Sse` wrapper.
async fn stream_response(state: Arc<A2aState>, request: JsonRpcRequest) -> Response {
    let method = request.method.clone();
    let events = match rpc::stream_dispatch(&state.engine, &method, request.params).await {
        Ok(events) => events,
        Err(err) => return rpc_error_response(request.id, &err),
    };

    let byte_stream = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, std::io::Error>(bytes::Bytes::from(format_event(Some("task_event"), &data)))
    });

    let mut response = Response::new(axum::body::Body::from_stream(byte_stream));
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response
}
