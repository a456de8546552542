use std::collections::BTreeMap;

use bytes::Bytes;
use gproxy_provider_core::principal::PrincipalRef;
use gproxy_provider_core::request::DispatchRequest;
use gproxy_provider_core::shape::ApiShape;
use http::HeaderMap;
use time::OffsetDateTime;

/// §4.1 Decoder failure modes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed request body: {0}")]
    InvalidRequest(String),
    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,
}

const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// `decode(apiShape, httpBody, headers) -> DispatchRequest` (§4.1). No side
/// effects besides allocation; `modelAlias` is pulled from the shape's
/// conventional `model` field and must be non-empty.
pub fn decode(
    api_shape: ApiShape,
    body: &Bytes,
    _headers: &HeaderMap,
    principal: PrincipalRef,
    trace_id: u128,
    request_id: u64,
    deadline: OffsetDateTime,
) -> Result<DispatchRequest, DecodeError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(DecodeError::PayloadTooLarge);
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| DecodeError::InvalidRequest(err.to_string()))?;

    let model_alias = extract_model_alias(api_shape, &value)?;

    let stream = value
        .get("stream")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
        && api_shape.supports_streaming();

    Ok(DispatchRequest {
        api_shape,
        model_alias,
        payload: value,
        stream,
        principal,
        trace_id,
        request_id,
        deadline,
        metadata: BTreeMap::new(),
    })
}

fn extract_model_alias(api_shape: ApiShape, value: &serde_json::Value) -> Result<String, DecodeError> {
    match api_shape {
        ApiShape::Gemini => {
            // Gemini's model alias arrives in the URL path, not the body;
            // the HTTP handler substitutes it via `DispatchRequest::model_alias`
            // after this call returns when decoding Gemini shapes. Here we
            // only validate `contents` is present and non-empty.
            let contents = value
                .get("contents")
                .and_then(|v| v.as_array())
                .ok_or_else(|| DecodeError::InvalidRequest("missing contents".to_string()))?;
            if contents.is_empty() {
                return Err(DecodeError::InvalidRequest("empty contents".to_string()));
            }
            Ok(String::new())
        }
        _ => {
            let messages_key = match api_shape {
                ApiShape::Chat | ApiShape::Messages => "messages",
                _ => "",
            };
            if !messages_key.is_empty() {
                let messages = value
                    .get(messages_key)
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| DecodeError::InvalidRequest(format!("missing {messages_key}")))?;
                if messages.is_empty() {
                    return Err(DecodeError::InvalidRequest(format!("empty {messages_key}")));
                }
            }
            let model = value
                .get("model")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DecodeError::InvalidRequest("missing model".to_string()))?;
            if model.is_empty() {
                return Err(DecodeError::InvalidRequest("empty model".to_string()));
            }
            Ok(model.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use gproxy_provider_core::principal::{Principal, PrincipalKind};

    fn principal() -> PrincipalRef {
        Arc::new(Principal {
            kind: PrincipalKind::ApiKey,
            id: "u1".to_string(),
            scope_tags: BTreeSet::new(),
            roles: BTreeSet::new(),
        })
    }

    fn deadline() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(2_000_000_000).unwrap()
    }

    #[test]
    fn empty_messages_is_invalid_request() {
        let body = Bytes::from_static(br#"{"model":"gpt-4o-mini","messages":[]}"#);
        let err = decode(
            ApiShape::Chat,
            &body,
            &HeaderMap::new(),
            principal(),
            1,
            1,
            deadline(),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRequest(_)));
    }

    #[test]
    fn valid_chat_request_decodes() {
        let body = Bytes::from_static(
            br#"{"model":"gpt-4o-mini","messages":[{"role":"user","content":"hi"}]}"#,
        );
        let req = decode(
            ApiShape::Chat,
            &body,
            &HeaderMap::new(),
            principal(),
            1,
            1,
            deadline(),
        )
        .unwrap();
        assert_eq!(req.model_alias, "gpt-4o-mini");
    }
}
