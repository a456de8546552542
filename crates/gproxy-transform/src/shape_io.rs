//! Per-`apiShape` decode/encode glue over the canonical IR (§4.6 step 1
//! "Request transformation", step 3 "Response normalization").
//!
//! Every Provider Adapter builds its vendor request the same way regardless
//! of which downstream `apiShape` the caller used: decode the caller's own
//! wire body into [`crate::canonical::Request`] here, then
//! `<vendor>::request_from_canonical`. This is what makes cross-vendor
//! routing possible — an alias can route a `messages`-shaped call to the
//! OpenAI adapter, which only has to know how to build its own wire
//! request from the canonical form, never how every other vendor's wire
//! shape looks.
//!
//! The four "generate content" shapes (chat, messages, gemini, responses)
//! go through here, per SPEC_FULL.md's streaming-transform-coverage
//! supplement; `embeddings`/`images`/`transcriptions` are OpenAI-native
//! pass-through shapes handled directly by the handler, never through the
//! canonical hub.

use gproxy_provider_core::{ApiShape, ErrorKind, GatewayError};
use serde_json::Value;

use crate::canonical::{Request, Response};
use crate::{claude, gemini, openai, responses};

/// Decode `payload` (the caller's own wire body, as stored verbatim on
/// `DispatchRequest::payload`) into the canonical request form, dispatching
/// on the caller's `apiShape`.
pub fn decode_request(shape: ApiShape, payload: &Value) -> Result<Request, GatewayError> {
    match shape {
        ApiShape::Chat => {
            let body = serde_json::from_value(payload.clone())
                .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("chat request: {err}")))?;
            Ok(openai::request_to_canonical(&body))
        }
        ApiShape::Messages => {
            let body = serde_json::from_value(payload.clone())
                .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("messages request: {err}")))?;
            Ok(claude::request_to_canonical(&body))
        }
        ApiShape::Gemini => {
            let body = serde_json::from_value(payload.clone())
                .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("gemini request: {err}")))?;
            Ok(gemini::request_to_canonical(&body))
        }
        ApiShape::Responses => {
            let body = serde_json::from_value(payload.clone())
                .map_err(|err| GatewayError::new(ErrorKind::InvalidRequest, format!("responses request: {err}")))?;
            Ok(responses::request_to_canonical(&body))
        }
        other => Err(GatewayError::new(
            ErrorKind::InvalidRequest,
            format!("{other} does not go through the canonical generate-content hub"),
        )),
    }
}

/// Encode a canonical response into the caller's own wire shape, producing
/// the JSON body the HTTP handler returns verbatim (§4.6 step 3).
pub fn encode_response(shape: ApiShape, response: &Response, id: &str, created: i64) -> Result<Value, GatewayError> {
    let value = match shape {
        ApiShape::Chat => serde_json::to_value(openai::response_from_canonical(response, id, created)),
        ApiShape::Messages => serde_json::to_value(claude::response_from_canonical(response, id)),
        ApiShape::Gemini => serde_json::to_value(gemini::response_from_canonical(response)),
        ApiShape::Responses => serde_json::to_value(responses::response_from_canonical(response, id, created)),
        other => {
            return Err(GatewayError::new(
                ErrorKind::InvalidRequest,
                format!("{other} does not go through the canonical generate-content hub"),
            ));
        }
    };
    value.map_err(|err| GatewayError::new(ErrorKind::Internal, format!("response encode: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_round_trips_through_canonical() {
        let payload = json!({
            "model": "ignored",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let canonical = decode_request(ApiShape::Chat, &payload).unwrap();
        assert_eq!(canonical.messages.len(), 1);
    }

    #[test]
    fn embeddings_shape_is_rejected_by_the_hub() {
        let payload = json!({});
        let err = decode_request(ApiShape::Embeddings, &payload).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }
}
