use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;

use crate::principal::PrincipalRef;
use crate::shape::ApiShape;

/// Immutable after construction (§3). Created by the Decoder, destroyed
/// when the response body (or stream) is fully consumed or cancelled.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub api_shape: ApiShape,
    pub model_alias: String,
    /// Shape-specific payload, kept as `Value` here since the concrete
    /// wire struct (`gproxy_protocol::openai::chat::CreateChatCompletionRequestBody`,
    /// etc.) varies per `api_shape`; the Decoder parses into the concrete
    /// type first to validate, then stores the re-serialized canonical form.
    pub payload: Value,
    pub stream: bool,
    pub principal: PrincipalRef,
    pub trace_id: u128,
    pub request_id: u64,
    pub deadline: OffsetDateTime,
    pub metadata: BTreeMap<String, String>,
}

impl DispatchRequest {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.deadline
    }

    /// `"<providerId>/<upstreamModel>"` direct-route escape hatch (§4.4 step 1).
    pub fn direct_route(&self) -> Option<(&str, &str)> {
        self.model_alias.split_once('/')
    }
}
