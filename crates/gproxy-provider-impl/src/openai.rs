//! OpenAI Chat Completions Provider Adapter (§4.6), plus the three
//! OpenAI-only pass-through shapes (Embeddings, Images, Transcriptions —
//! SPEC_FULL.md streaming-transform-coverage Supplement) that never go
//! through the canonical hub: the caller's JSON body is the OpenAI wire
//! body already, so these three only need upstream auth/dispatch plumbing,
//! not request/response transformation.

use async_trait::async_trait;
use base64::Engine;
use futures_util::StreamExt;
use gproxy_protocol::openai::chat::{CreateChatCompletionRequestBody, CreateChatCompletionResponseBody};
use gproxy_protocol::openai::embeddings::CreateEmbeddingsRequestBody;
use gproxy_protocol::openai::images::CreateImageRequestBody;
use gproxy_protocol::sse::SseParser;
use gproxy_provider_core::{ApiShape, AttemptContext, ErrorKind, GatewayError, NormalizedResponse, Provider, ProviderProbe, StreamSink};
use gproxy_transform::openai as transform;
use gproxy_transform::shape_io;
use serde_json::Value;

use crate::http_support::{classify_status, log_upstream_request, log_upstream_response_err, log_upstream_response_ok, network_failure, truncate};

/// Decoder convention for `/v1/audio/transcriptions` (SPEC_FULL.md): the
/// handler extracts the multipart fields into a JSON object shaped like
/// [`CreateTranscriptionRequestBody`](gproxy_protocol::openai::audio::CreateTranscriptionRequestBody)
/// plus these three keys carrying the uploaded file, since `DispatchRequest::payload`
/// is a plain `serde_json::Value` with no byte-stream slot of its own.
pub const TRANSCRIPTION_FILE_NAME_KEY: &str = "file_name";
pub const TRANSCRIPTION_FILE_CONTENT_TYPE_KEY: &str = "file_content_type";
pub const TRANSCRIPTION_FILE_BASE64_KEY: &str = "file_base64";

/// Builds the Chat Completions wire body regardless of which `apiShape` the
/// caller actually used: a `chat`-shaped payload deserializes straight into
/// the wire type, anything else (`messages`, `gemini`, `responses`) goes
/// through the canonical hub first (§4.6 step 1).
fn build_request(
    source_shape: ApiShape,
    payload: &Value,
    upstream_model: &str,
) -> Result<CreateChatCompletionRequestBody, GatewayError> {
    let mut body = if source_shape == ApiShape::Chat {
        serde_json::from_value(payload.clone())
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("openai request encode: {err}")))?
    } else {
        let canonical = shape_io::decode_request(source_shape, payload)?;
        transform::request_from_canonical(&canonical, upstream_model)
    };
    body.model = upstream_model.to_string();
    Ok(body)
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl OpenAiProvider {
    async fn execute_embeddings(&self, ctx: AttemptContext, payload: &Value, upstream_model: &str) -> Result<NormalizedResponse, GatewayError> {
        let mut body: CreateEmbeddingsRequestBody = serde_json::from_value(payload.clone())
            .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("embeddings request decode: {err}")))?;
        body.model = upstream_model.to_string();

        let url = format!("{}/embeddings", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "openai", "POST", &url, false);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &err);
                network_failure("openai", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &text);
            return Err(classify_status("openai", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "openai", status, started.elapsed().as_millis(), false);

        let content: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("openai response decode: {err}")))?;
        let tokens_in = content
            .get("usage")
            .and_then(|usage| usage.get("prompt_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        Ok(NormalizedResponse {
            upstream_model: upstream_model.to_string(),
            content,
            finish_reason: None,
            tokens_in,
            tokens_out: 0,
        })
    }

    async fn execute_images(&self, ctx: AttemptContext, payload: &Value, upstream_model: &str) -> Result<NormalizedResponse, GatewayError> {
        let mut body: CreateImageRequestBody = serde_json::from_value(payload.clone())
            .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("image request decode: {err}")))?;
        body.model = upstream_model.to_string();

        let url = format!("{}/images/generations", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "openai", "POST", &url, false);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &err);
                network_failure("openai", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &text);
            return Err(classify_status("openai", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "openai", status, started.elapsed().as_millis(), false);

        let content: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("openai response decode: {err}")))?;

        // Images carry no token usage; cost is estimated flat-rate by the
        // Dispatcher's `CostTable::estimate_flat("images")` instead (SPEC_FULL.md
        // cost-model Supplement).
        Ok(NormalizedResponse {
            upstream_model: upstream_model.to_string(),
            content,
            finish_reason: None,
            tokens_in: 0,
            tokens_out: 0,
        })
    }

    async fn execute_transcription(&self, ctx: AttemptContext, payload: &Value, upstream_model: &str) -> Result<NormalizedResponse, GatewayError> {
        let file_name = payload
            .get(TRANSCRIPTION_FILE_NAME_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::new(ErrorKind::InvalidRequest, "missing uploaded file name"))?
            .to_string();
        let content_type = payload
            .get(TRANSCRIPTION_FILE_CONTENT_TYPE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_base64 = payload
            .get(TRANSCRIPTION_FILE_BASE64_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::new(ErrorKind::InvalidRequest, "missing uploaded file contents"))?;
        let file_bytes = base64::engine::general_purpose::STANDARD
            .decode(file_base64)
            .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("invalid file encoding: {err}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", upstream_model.to_string())
            .part("file", reqwest::multipart::Part::bytes(file_bytes).file_name(file_name).mime_str(&content_type).map_err(
                |err| GatewayError::new(ErrorKind::InvalidRequest, format!("invalid file content type: {err}")),
            )?);
        if let Some(language) = payload.get("language").and_then(|v| v.as_str()) {
            form = form.text("language", language.to_string());
        }
        if let Some(prompt) = payload.get("prompt").and_then(|v| v.as_str()) {
            form = form.text("prompt", prompt.to_string());
        }
        if let Some(response_format) = payload.get("response_format").and_then(|v| v.as_str()) {
            form = form.text("response_format", response_format.to_string());
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "openai", "POST", &url, false);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &err);
                network_failure("openai", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &text);
            return Err(classify_status("openai", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "openai", status, started.elapsed().as_millis(), false);

        let content: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("openai response decode: {err}")))?;

        Ok(NormalizedResponse {
            upstream_model: upstream_model.to_string(),
            content,
            finish_reason: None,
            tokens_in: 0,
            tokens_out: 0,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supported_shapes(&self) -> &[ApiShape] {
        &[
            ApiShape::Chat,
            ApiShape::Responses,
            ApiShape::Messages,
            ApiShape::Gemini,
            ApiShape::Embeddings,
            ApiShape::Images,
            ApiShape::Transcriptions,
        ]
    }

    async fn execute(
        &self,
        ctx: AttemptContext,
        source_shape: ApiShape,
        payload: &Value,
        upstream_model: &str,
    ) -> Result<NormalizedResponse, GatewayError> {
        match source_shape {
            ApiShape::Embeddings => return self.execute_embeddings(ctx, payload, upstream_model).await,
            ApiShape::Images => return self.execute_images(ctx, payload, upstream_model).await,
            ApiShape::Transcriptions => return self.execute_transcription(ctx, payload, upstream_model).await,
            _ => {}
        }

        let mut body = build_request(source_shape, payload, upstream_model)?;
        body.stream = Some(false);

        let url = format!("{}/chat/completions", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "openai", "POST", &url, false);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &err);
                network_failure("openai", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &text);
            return Err(classify_status("openai", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "openai", status, started.elapsed().as_millis(), false);

        let wire: CreateChatCompletionResponseBody = response
            .json()
            .await
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("openai response decode: {err}")))?;
        let canonical = transform::response_to_canonical(&wire);
        let content = serde_json::to_value(&canonical)
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("openai response normalize: {err}")))?;

        Ok(NormalizedResponse {
            upstream_model: wire.model,
            content,
            finish_reason: canonical.finish_reason,
            tokens_in: canonical.usage.input_tokens,
            tokens_out: canonical.usage.output_tokens,
        })
    }

    async fn execute_streaming(
        &self,
        ctx: AttemptContext,
        source_shape: ApiShape,
        payload: &Value,
        upstream_model: &str,
        sink: &(dyn StreamSink + Send + Sync),
    ) -> Result<(), GatewayError> {
        // `ApiShape::supports_streaming` gates `stream` to false at decode
        // time for the three pass-through shapes (§4.1), so the Dispatcher
        // never routes them here; `build_request` below would reject them
        // anyway since it only knows the Chat wire body.
        let mut body = build_request(source_shape, payload, upstream_model)?;
        body.stream = Some(true);

        let url = format!("{}/chat/completions", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "openai", "POST", &url, true);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "openai", started.elapsed().as_millis(), &err);
                network_failure("openai", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("openai", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "openai", status, started.elapsed().as_millis(), true);

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if ctx.cancel.is_cancelled() {
                return Err(GatewayError::new(ErrorKind::Cancelled, "downstream cancelled"));
            }
            let bytes = chunk.map_err(|err| network_failure("openai", err))?;
            for event in parser.push_bytes(&bytes) {
                if let Some(chunk_event) = transform::decode_stream_event(&event) {
                    sink.push(chunk_event).await?;
                }
            }
        }
        for event in parser.finish() {
            if let Some(chunk_event) = transform::decode_stream_event(&event) {
                sink.push(chunk_event).await?;
            }
        }
        sink.finish().await;
        Ok(())
    }

    async fn probe(&self, _ctx: AttemptContext) -> ProviderProbe {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) if response.status().is_success() => ProviderProbe::Healthy,
            Ok(_) => ProviderProbe::Degraded,
            Err(_) => ProviderProbe::Down,
        }
    }
}

#[cfg(test)]
mod tests {
    use gproxy_provider_core::CancelSignal;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(reqwest::Client::new(), "https://api.openai.test/v1", "sk-test")
    }

    fn attempt_ctx() -> AttemptContext {
        AttemptContext {
            trace_id: 1,
            request_id: 1,
            attempt_index: 0,
            deadline: OffsetDateTime::now_utc() + time::Duration::seconds(30),
            cancel: CancelSignal::new(),
        }
    }

    #[test]
    fn build_request_from_chat_shape_overrides_the_model_with_the_resolved_upstream_one() {
        let payload = json!({
            "model": "whatever-the-caller-sent",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let body = build_request(ApiShape::Chat, &payload, "gpt-4o-mini").unwrap();

        assert_eq!(body.model, "gpt-4o-mini");
        assert_eq!(body.messages.len(), 1);
    }

    #[test]
    fn build_request_from_messages_shape_goes_through_the_canonical_hub() {
        let payload = json!({
            "model": "claude-3-ignored",
            "max_tokens": 128,
            "messages": [{"role": "user", "content": "hi"}]
        });

        let body = build_request(ApiShape::Messages, &payload, "gpt-4o-mini").unwrap();

        assert_eq!(body.model, "gpt-4o-mini");
        assert_eq!(body.messages.len(), 1);
    }

    #[test]
    fn build_request_rejects_a_malformed_chat_payload() {
        let payload = json!({"not": "a chat body"});
        let err = build_request(ApiShape::Chat, &payload, "gpt-4o-mini").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn execute_transcription_rejects_a_payload_missing_the_uploaded_file() {
        let ctx = attempt_ctx();
        let err = provider()
            .execute_transcription(ctx, &json!({}), "whisper-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(err.message.contains("file name"));
    }

    #[tokio::test]
    async fn execute_transcription_rejects_invalid_base64_file_contents() {
        let ctx = attempt_ctx();
        let payload = json!({
            TRANSCRIPTION_FILE_NAME_KEY: "clip.mp3",
            TRANSCRIPTION_FILE_BASE64_KEY: "not valid base64!!",
        });
        let err = provider().execute_transcription(ctx, &payload, "whisper-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn supported_shapes_covers_every_openai_native_and_hub_shape() {
        let shapes = provider().supported_shapes();
        for shape in [
            ApiShape::Chat,
            ApiShape::Responses,
            ApiShape::Messages,
            ApiShape::Gemini,
            ApiShape::Embeddings,
            ApiShape::Images,
            ApiShape::Transcriptions,
        ] {
            assert!(shapes.contains(&shape), "missing {shape:?}");
        }
    }
}
