//! Axum handler wiring for the downstream HTTP surface (§6) that does not
//! require the A2A crate or a concrete storage backend: the five OpenAI
//! shapes, Anthropic Messages (both mount points), Gemini generateContent,
//! `/v1/models`, and `/health`. `/a2a`, `/.well-known/agent.json`, and
//! `/metrics` are mounted by `apps/gproxy` directly, since they need
//! `gproxy-a2a` and `gproxy-storage`'s metrics sink, neither of which this
//! crate depends on. Grounded on the teacher's `gproxy-core/src/handler.rs`
//! `proxy_handler` shape: decode, authenticate, call, log, render.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use bytes::Bytes;
use futures_core::Stream;
use gproxy_common::ids::{RequestId, TraceId};
use gproxy_provider_core::{ApiShape, CancelSignal, GatewayError, ErrorKind, ProxyResponse};
use gproxy_provider_impl::{
    TRANSCRIPTION_FILE_BASE64_KEY, TRANSCRIPTION_FILE_CONTENT_TYPE_KEY, TRANSCRIPTION_FILE_NAME_KEY,
};
use gproxy_router::AliasTable;
use http::{HeaderMap, HeaderValue};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::auth::{AuthError, CredentialCache};
use crate::decode::{self, DecodeError};
use crate::dispatcher::Dispatcher;
use crate::error_http::HttpGatewayError;
use crate::quota::{QuotaAdmission, QuotaDecision, QuotaDenyKind, QuotaEstimate};

/// Shared state every downstream route handler closes over. Grounded on the
/// teacher's `Arc<CoreState>` extractor pattern.
pub struct AppState {
    pub auth: Arc<CredentialCache>,
    pub quota: Arc<QuotaAdmission>,
    pub dispatcher: Arc<Dispatcher>,
    pub aliases: Arc<AliasTable>,
    pub request_deadline: Duration,
}

pub fn build_router(state: Arc<AppState>) -> AxumRouter {
    AxumRouter::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(responses))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/images/generations", post(images))
        .route("/v1/audio/transcriptions", post(transcriptions))
        .route("/v1/models", get(list_models))
        .route("/v1/messages", post(messages))
        .route("/anthropic/v1/messages", post(messages))
        .route("/v1beta/models/{model_action}", post(gemini_generate))
        .route("/health", get(health))
        .with_state(state)
}

async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch_json(&state, ApiShape::Chat, false, &headers, body, None, None).await
}

async fn responses(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch_json(&state, ApiShape::Responses, false, &headers, body, None, None).await
}

async fn embeddings(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch_json(&state, ApiShape::Embeddings, false, &headers, body, None, None).await
}

async fn images(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch_json(&state, ApiShape::Images, false, &headers, body, None, None).await
}

async fn messages(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch_json(&state, ApiShape::Messages, false, &headers, body, None, None).await
}

/// `/v1/audio/transcriptions` arrives as `multipart/form-data`; the
/// multipart-to-JSON convention (SPEC_FULL.md Supplement, §4.6 entry in
/// DESIGN.md) base64-encodes the file part into a plain JSON body so the
/// rest of the pipeline never has to know about multipart at all.
async fn transcriptions(State(state): State<Arc<AppState>>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let mut fields = serde_json::Map::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return HttpGatewayError(GatewayError::invalid_request(format!("malformed multipart body: {err}")))
                    .into_response();
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload.bin").to_string();
            let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
            let bytes = match field.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    return HttpGatewayError(GatewayError::invalid_request(format!("malformed file part: {err}")))
                        .into_response();
                }
            };
            use base64::Engine;
            fields.insert(TRANSCRIPTION_FILE_NAME_KEY.to_string(), json!(file_name));
            fields.insert(TRANSCRIPTION_FILE_CONTENT_TYPE_KEY.to_string(), json!(content_type));
            fields.insert(
                TRANSCRIPTION_FILE_BASE64_KEY.to_string(),
                json!(base64::engine::general_purpose::STANDARD.encode(&bytes)),
            );
        } else if let Ok(text) = field.text().await {
            fields.insert(name, json!(text));
        }
    }
    let body = match serde_json::to_vec(&serde_json::Value::Object(fields)) {
        Ok(body) => Bytes::from(body),
        Err(err) => return HttpGatewayError(GatewayError::internal(format!("multipart re-encode: {err}"))).into_response(),
    };
    dispatch_json(&state, ApiShape::Transcriptions, false, &headers, body, None, None).await
}

/// `/v1beta/models/{model}:{action}` — the model and the `generateContent`
/// / `streamGenerateContent` action arrive as one path segment joined by a
/// colon (§6).
async fn gemini_generate(
    State(state): State<Arc<AppState>>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((model, action)) = model_action.split_once(':') else {
        return HttpGatewayError(GatewayError::invalid_request("expected {model}:{action} path segment")).into_response();
    };
    let stream = match action {
        "generateContent" => false,
        "streamGenerateContent" => true,
        other => {
            return HttpGatewayError(GatewayError::invalid_request(format!("unsupported gemini action: {other}")))
                .into_response();
        }
    };
    dispatch_json(&state, ApiShape::Gemini, true, &headers, body, Some(model.to_string()), Some(stream)).await
}

async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let created = OffsetDateTime::now_utc().unix_timestamp();
    let data: Vec<_> = state
        .aliases
        .aliases()
        .map(|alias| {
            json!({
                "id": alias,
                "object": "model",
                "created": created,
                "owned_by": "gproxy",
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data })).into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_json(
    state: &AppState,
    api_shape: ApiShape,
    gemini_ingress: bool,
    headers: &HeaderMap,
    body: Bytes,
    model_override: Option<String>,
    stream_override: Option<bool>,
) -> Response {
    let principal = match state.auth.authenticate(headers, gemini_ingress) {
        Ok(principal) => principal,
        Err(err) => return auth_error_response(err),
    };

    let now = OffsetDateTime::now_utc();
    let trace_id = TraceId::new().as_u128();
    let request_id = RequestId::new().as_u64();
    let deadline = now + state.request_deadline;

    let mut request = match decode::decode(api_shape, &body, headers, principal.clone(), trace_id, request_id, deadline) {
        Ok(request) => request,
        Err(err) => return decode_error_response(err),
    };
    if let Some(model) = model_override {
        request.model_alias = model;
    }
    if let Some(stream) = stream_override {
        request.stream = stream;
    }

    let estimate = QuotaEstimate {
        tokens_in: (body.len() / 4) as u64,
    };
    match state.quota.admit(&principal.id, estimate, now) {
        QuotaDecision::Allow => {}
        QuotaDecision::Deny { kind, retry_after } => return quota_deny_response(kind, retry_after),
    }

    info!(
        trace_id = %format_trace_id(trace_id),
        api_shape = %api_shape,
        model_alias = %request.model_alias,
        stream = request.stream,
        "downstream request accepted"
    );

    let cancel = CancelSignal::new();
    match state.dispatcher.dispatch(request, cancel.clone()).await {
        Ok(response) => render_proxy_response(response, trace_id, cancel),
        Err(err) => {
            warn!(trace_id = %format_trace_id(trace_id), kind = ?err.kind, message = %err.message, "dispatch failed");
            HttpGatewayError(err).into_response()
        }
    }
}

fn render_proxy_response(response: ProxyResponse, trace_id: u128, cancel: CancelSignal) -> Response {
    let trace_header = HeaderValue::from_str(&format_trace_id(trace_id)).ok();
    match response {
        ProxyResponse::Json { status, headers, body } => {
            let mut resp = Response::new(axum::body::Body::from(body));
            *resp.status_mut() = status;
            resp.headers_mut().extend(headers);
            if let Some(value) = trace_header {
                resp.headers_mut().insert("x-gproxy-request-id", value);
            }
            resp
        }
        ProxyResponse::Stream { status, headers, body } => {
            let content_type = body.content_type;
            let guarded = CancelOnDrop {
                inner: body.stream,
                cancel,
            };
            let mut resp = Response::new(axum::body::Body::from_stream(guarded));
            *resp.status_mut() = status;
            resp.headers_mut().extend(headers);
            if !resp.headers().contains_key(http::header::CONTENT_TYPE) {
                resp.headers_mut()
                    .insert(http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            if let Some(value) = trace_header {
                resp.headers_mut().insert("x-gproxy-request-id", value);
            }
            resp
        }
    }
}

/// Flips the request's [`CancelSignal`] when the response body stream is
/// dropped — axum drops the body as soon as the client disconnects, which is
/// the only disconnect signal available at this layer (§5: "cancellation
/// propagates from caller disconnect").
struct CancelOnDrop {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>,
    cancel: CancelSignal,
}

impl Stream for CancelOnDrop {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn auth_error_response(err: AuthError) -> Response {
    let kind = match err {
        AuthError::Unauthenticated => ErrorKind::Unauthenticated,
        AuthError::InvalidCredential => ErrorKind::Unauthenticated,
        AuthError::Revoked => ErrorKind::Forbidden,
    };
    HttpGatewayError(GatewayError::new(kind, err.to_string())).into_response()
}

fn decode_error_response(err: DecodeError) -> Response {
    let kind = match err {
        DecodeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        DecodeError::PayloadTooLarge => ErrorKind::InvalidRequest,
    };
    HttpGatewayError(GatewayError::new(kind, err.to_string())).into_response()
}

/// Renders the request-scoped `u128` trace id the same way
/// [`gproxy_common::ids::TraceId`]'s `Display` impl does, without needing a
/// typed wrapper around a value the Dispatcher already carries as a bare
/// `u128` (`DispatchRequest::trace_id`).
fn format_trace_id(trace_id: u128) -> String {
    format!("{trace_id:032x}")
}

fn quota_deny_response(kind: QuotaDenyKind, retry_after: Duration) -> Response {
    let message = match kind {
        QuotaDenyKind::Requests => "request quota exceeded",
        QuotaDenyKind::Tokens => "token quota exceeded",
        QuotaDenyKind::Cost => "cost quota exceeded",
    };
    HttpGatewayError(
        GatewayError::new(ErrorKind::QuotaExceeded, message).with_retry_after_secs(retry_after.as_secs()),
    )
    .into_response()
}
