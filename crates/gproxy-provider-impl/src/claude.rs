//! Anthropic Messages Provider Adapter (§4.6).

use async_trait::async_trait;
use futures_util::StreamExt;
use gproxy_protocol::claude::messages::{CreateMessageRequestBody, CreateMessageResponseBody};
use gproxy_protocol::sse::SseParser;
use gproxy_provider_core::{ApiShape, AttemptContext, ErrorKind, GatewayError, NormalizedResponse, Provider, ProviderProbe, StreamSink};
use gproxy_transform::claude as transform;
use gproxy_transform::shape_io;
use serde_json::Value;

use crate::http_support::{classify_status, log_upstream_request, log_upstream_response_err, log_upstream_response_ok, network_failure, truncate};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Builds the Messages wire body regardless of which `apiShape` the caller
/// actually used, mirroring `openai::build_request` (§4.6 step 1).
fn build_request(
    source_shape: ApiShape,
    payload: &Value,
    upstream_model: &str,
) -> Result<CreateMessageRequestBody, GatewayError> {
    let mut body = if source_shape == ApiShape::Messages {
        serde_json::from_value(payload.clone())
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("anthropic request encode: {err}")))?
    } else {
        let canonical = shape_io::decode_request(source_shape, payload)?;
        transform::request_from_canonical(&canonical, upstream_model)
    };
    body.model = upstream_model.to_string();
    Ok(body)
}

pub struct ClaudeProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ClaudeProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supported_shapes(&self) -> &[ApiShape] {
        &[ApiShape::Messages, ApiShape::Chat, ApiShape::Gemini, ApiShape::Responses]
    }

    async fn execute(
        &self,
        ctx: AttemptContext,
        source_shape: ApiShape,
        payload: &Value,
        upstream_model: &str,
    ) -> Result<NormalizedResponse, GatewayError> {
        let mut body = build_request(source_shape, payload, upstream_model)?;
        body.stream = Some(false);

        let url = format!("{}/v1/messages", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "anthropic", "POST", &url, false);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "anthropic", started.elapsed().as_millis(), &err);
                network_failure("anthropic", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_upstream_response_err(ctx.trace_id, "anthropic", started.elapsed().as_millis(), &text);
            return Err(classify_status("anthropic", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "anthropic", status, started.elapsed().as_millis(), false);

        let wire: CreateMessageResponseBody = response
            .json()
            .await
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("anthropic response decode: {err}")))?;
        let canonical = transform::response_to_canonical(&wire);
        let content = serde_json::to_value(&canonical)
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("anthropic response normalize: {err}")))?;

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
        let mut body = build_request(source_shape, payload, upstream_model)?;
        body.stream = Some(true);

        let url = format!("{}/v1/messages", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "anthropic", "POST", &url, true);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "anthropic", started.elapsed().as_millis(), &err);
                network_failure("anthropic", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("anthropic", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "anthropic", status, started.elapsed().as_millis(), true);

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if ctx.cancel.is_cancelled() {
                return Err(GatewayError::new(ErrorKind::Cancelled, "downstream cancelled"));
            }
            let bytes = chunk.map_err(|err| network_failure("anthropic", err))?;
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
        let url = format!("{}/v1/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => ProviderProbe::Healthy,
            Ok(_) => ProviderProbe::Degraded,
            Err(_) => ProviderProbe::Down,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn build_request_from_messages_shape_overrides_the_model_with_the_resolved_upstream_one() {
        let payload = json!({
            "model": "whatever-the-caller-sent",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "hi"}]
        });

        let body = build_request(ApiShape::Messages, &payload, "claude-3-5-sonnet").unwrap();

        assert_eq!(body.model, "claude-3-5-sonnet");
        assert_eq!(body.max_tokens, 256);
    }

    #[test]
    fn build_request_from_chat_shape_goes_through_the_canonical_hub_and_defaults_max_tokens() {
        let payload = json!({
            "model": "gpt-4o-ignored",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let body = build_request(ApiShape::Chat, &payload, "claude-3-5-sonnet").unwrap();

        assert_eq!(body.model, "claude-3-5-sonnet");
        assert_eq!(body.max_tokens, 4096, "anthropic requires max_tokens; canonical default fills it in");
    }

    #[test]
    fn build_request_rejects_a_malformed_messages_payload() {
        let payload = json!({"not": "an anthropic body"});
        let err = build_request(ApiShape::Messages, &payload, "claude-3-5-sonnet").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn supported_shapes_does_not_include_embeddings_or_images() {
        let provider = ClaudeProvider::new(reqwest::Client::new(), "https://api.anthropic.test", "key");
        let shapes = provider.supported_shapes();
        assert!(shapes.contains(&ApiShape::Messages));
        assert!(!shapes.contains(&ApiShape::Embeddings));
        assert!(!shapes.contains(&ApiShape::Images));
    }
}
