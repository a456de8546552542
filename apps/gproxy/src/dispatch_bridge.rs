//! The concrete [`gproxy_a2a::TaskDispatch`] implementation: builds a chat-
//! shaped [`DispatchRequest`] from a task's inbound `Message` and runs it
//! through the same [`Dispatcher`] the downstream HTTP surface uses (§4.9:
//! "A2A traffic enters the same Dispatcher via a wrapping Task Engine").
//! A2A tasks are not bound to a downstream `Principal` by the §3 data
//! model, so quota/usage accounting for task-originated traffic runs under
//! one fixed internal principal rather than per-caller quota — the same
//! relaxation the spec leaves implicit by never adding a `principal` field
//! to `Task` (DESIGN.md Open Question resolutions).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gproxy_a2a::{TaskDispatch, TaskDispatchOutcome};
use gproxy_core::Dispatcher;
use gproxy_provider_core::context::CancelSignal;
use gproxy_provider_core::error::{ErrorKind, GatewayError};
use gproxy_provider_core::principal::{Principal, PrincipalKind, PrincipalRef};
use gproxy_provider_core::request::DispatchRequest;
use gproxy_provider_core::response::ProxyResponse;
use gproxy_provider_core::shape::ApiShape;

pub struct GatewayTaskDispatch {
    dispatcher: Arc<Dispatcher>,
    model_alias: String,
    principal: PrincipalRef,
    deadline: Duration,
}

impl GatewayTaskDispatch {
    pub fn new(dispatcher: Arc<Dispatcher>, model_alias: String, deadline: Duration) -> Self {
        Self {
            dispatcher,
            model_alias,
            principal: Arc::new(Principal {
                kind: PrincipalKind::ApiKey,
                id: "a2a-internal".to_string(),
                scope_tags: Default::default(),
                roles: Default::default(),
            }),
            deadline,
        }
    }
}

#[async_trait]
impl TaskDispatch for GatewayTaskDispatch {
    async fn dispatch_task_message(
        &self,
        task: &gproxy_a2a::model::Task,
        message: &gproxy_a2a::model::Message,
    ) -> Result<TaskDispatchOutcome, GatewayError> {
        let text = extract_text(message);
        let mut messages: Vec<serde_json::Value> = Vec::new();
        for history_message in &task.history {
            messages.push(serde_json::json!({
                "role": role_str(history_message.role),
                "content": extract_text(history_message),
            }));
        }
        if messages.is_empty() {
            messages.push(serde_json::json!({ "role": "user", "content": text }));
        }

        let now = time::OffsetDateTime::now_utc();
        let request = DispatchRequest {
            api_shape: ApiShape::Chat,
            model_alias: self.model_alias.clone(),
            payload: serde_json::json!({
                "model": self.model_alias,
                "messages": messages,
                "stream": false,
            }),
            stream: false,
            principal: self.principal.clone(),
            trace_id: gproxy_common::ids::TraceId::new().as_u128(),
            request_id: gproxy_common::ids::RequestId::new().as_u64(),
            deadline: now + self.deadline,
            metadata: BTreeMap::from([("a2a_task_id".to_string(), task.task_id.clone())]),
        };

        let response = self.dispatcher.dispatch(request, CancelSignal::new()).await?;
        let ProxyResponse::Json { body, .. } = response else {
            return Err(GatewayError::new(ErrorKind::Internal, "a2a dispatch produced a streaming response, which the task engine cannot consume"));
        };

        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|err| GatewayError::new(ErrorKind::UpstreamProtocol, format!("malformed chat completion body: {err}")))?;
        let content = value
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(TaskDispatchOutcome::Completed {
            message: gproxy_a2a::model::Message::text(gproxy_a2a::model::Role::Assistant, content, time::OffsetDateTime::now_utc()),
            artifacts: Vec::new(),
        })
    }
}

fn role_str(role: gproxy_a2a::model::Role) -> &'static str {
    match role {
        gproxy_a2a::model::Role::User => "user",
        gproxy_a2a::model::Role::Assistant => "assistant",
        gproxy_a2a::model::Role::Tool => "tool",
    }
}

fn extract_text(message: &gproxy_a2a::model::Message) -> String {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            gproxy_a2a::model::Part::Text { text } => Some(text.clone()),
            gproxy_a2a::model::Part::Data { data } => Some(data.to_string()),
            gproxy_a2a::model::Part::File { name, .. } => Some(format!("[file: {name}]")),
            gproxy_a2a::model::Part::FunctionCall { name, arguments, .. } => {
                Some(format!("[function_call: {name}({arguments})]"))
            }
            gproxy_a2a::model::Part::FunctionResponse { name, response, .. } => {
                Some(format!("[function_response: {name} -> {response}]"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
