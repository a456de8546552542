//! Gemini generateContent Provider Adapter (§4.6).

use async_trait::async_trait;
use futures_util::StreamExt;
use gproxy_protocol::gemini::generate_content::{GenerateContentRequestBody, GenerateContentResponseBody};
use gproxy_protocol::sse::SseParser;
use gproxy_provider_core::{ApiShape, AttemptContext, ErrorKind, GatewayError, NormalizedResponse, Provider, ProviderProbe, StreamSink};
use gproxy_transform::gemini as transform;
use gproxy_transform::shape_io;
use serde_json::Value;

use crate::http_support::{classify_status, log_upstream_request, log_upstream_response_err, log_upstream_response_ok, network_failure, truncate};

/// Builds the generateContent wire body regardless of which `apiShape` the
/// caller actually used — the target model lives in the URL path, not the
/// body, so unlike the OpenAI/Anthropic adapters there is no model field to
/// stamp afterward (§4.6 step 1).
fn build_request(source_shape: ApiShape, payload: &Value) -> Result<GenerateContentRequestBody, GatewayError> {
    if source_shape == ApiShape::Gemini {
        serde_json::from_value(payload.clone())
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("gemini request encode: {err}")))
    } else {
        let canonical = shape_io::decode_request(source_shape, payload)?;
        Ok(transform::request_from_canonical(&canonical))
    }
}

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supported_shapes(&self) -> &[ApiShape] {
        &[ApiShape::Gemini, ApiShape::Chat, ApiShape::Messages, ApiShape::Responses]
    }

    async fn execute(
        &self,
        ctx: AttemptContext,
        source_shape: ApiShape,
        payload: &Value,
        upstream_model: &str,
    ) -> Result<NormalizedResponse, GatewayError> {
        let body = build_request(source_shape, payload)?;

        let url = format!("{}/models/{upstream_model}:generateContent", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "gemini", "POST", &url, false);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "gemini", started.elapsed().as_millis(), &err);
                network_failure("gemini", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_upstream_response_err(ctx.trace_id, "gemini", started.elapsed().as_millis(), &text);
            return Err(classify_status("gemini", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "gemini", status, started.elapsed().as_millis(), false);

        let wire: GenerateContentResponseBody = response
            .json()
            .await
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("gemini response decode: {err}")))?;
        let canonical = transform::response_to_canonical(&wire);
        let content = serde_json::to_value(&canonical)
            .map_err(|err| GatewayError::new(ErrorKind::Internal, format!("gemini response normalize: {err}")))?;

        Ok(NormalizedResponse {
            upstream_model: wire.model_version,
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
        let body = build_request(source_shape, payload)?;

        // `alt=sse` asks Gemini to frame the chunked response as standard
        // `text/event-stream`, the same framing the OpenAI/Anthropic
        // adapters already parse with `SseParser` (§4.6 step 4).
        let url = format!("{}/models/{upstream_model}:streamGenerateContent?alt=sse", self.base_url);
        let started = log_upstream_request(ctx.trace_id, "gemini", "POST", &url, true);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                log_upstream_response_err(ctx.trace_id, "gemini", started.elapsed().as_millis(), &err);
                network_failure("gemini", err)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status("gemini", status, &headers, &truncate(&text, 500)));
        }
        log_upstream_response_ok(ctx.trace_id, "gemini", status, started.elapsed().as_millis(), true);

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if ctx.cancel.is_cancelled() {
                return Err(GatewayError::new(ErrorKind::Cancelled, "downstream cancelled"));
            }
            let bytes = chunk.map_err(|err| network_failure("gemini", err))?;
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
        match self.client.get(&url).header("x-goog-api-key", &self.api_key).send().await {
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
    fn build_request_from_gemini_shape_decodes_the_wire_body_directly() {
        let payload = json!({
            "contents": [{"role": "user", "parts": [{"type": "Text", "text": "hi"}]}]
        });

        let body = build_request(ApiShape::Gemini, &payload).unwrap();

        assert_eq!(body.contents.len(), 1);
    }

    #[test]
    fn build_request_from_chat_shape_goes_through_the_canonical_hub() {
        let payload = json!({
            "model": "gpt-4o-ignored",
            "messages": [{"role": "user", "content": "hi"}]
        });

        let body = build_request(ApiShape::Chat, &payload).unwrap();

        assert_eq!(body.contents.len(), 1);
        assert_eq!(body.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn build_request_rejects_a_malformed_gemini_payload() {
        let payload = json!({"not": "a gemini body"});
        let err = build_request(ApiShape::Gemini, &payload).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn supported_shapes_does_not_include_embeddings_or_transcriptions() {
        let provider = GeminiProvider::new(reqwest::Client::new(), "https://generativelanguage.test", "key");
        let shapes = provider.supported_shapes();
        assert!(shapes.contains(&ApiShape::Gemini));
        assert!(!shapes.contains(&ApiShape::Embeddings));
        assert!(!shapes.contains(&ApiShape::Transcriptions));
    }
}
