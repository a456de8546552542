//! The JSON-RPC 2.0 envelope (§6: `POST /a2a`) and method dispatch table
//! (§4.9). `message/stream` and `tasks/resubscribe` are handled separately
//! ([`stream_dispatch`]) since their result is an event stream, not a single
//! JSON value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use gproxy_provider_core::error::{ErrorKind, GatewayError};
use time::OffsetDateTime;

use crate::agent_card::{AgentCardConfig, build_agent_card};
use crate::engine::TaskEngine;
use crate::model::{Message, PushConfig, TaskEvent, TaskFilter, TaskId, TaskStatus};

pub const METHOD_MESSAGE_SEND: &str = "message/send";
pub const METHOD_MESSAGE_STREAM: &str = "message/stream";
pub const METHOD_TASKS_GET: &str = "tasks/get";
pub const METHOD_TASKS_LIST: &str = "tasks/list";
pub const METHOD_TASKS_CANCEL: &str = "tasks/cancel";
pub const METHOD_TASKS_RESUBSCRIBE: &str = "tasks/resubscribe";
pub const METHOD_PUSH_SET: &str = "tasks/pushNotificationConfig/set";
pub const METHOD_PUSH_GET: &str = "tasks/pushNotificationConfig/get";
pub const METHOD_PUSH_DELETE: &str = "tasks/pushNotificationConfig/delete";
pub const METHOD_AGENT_CARD: &str = "agent/authenticatedExtendedCard";

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id }
    }

    pub fn failure(id: Value, error: &GatewayError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcErrorObject {
                code: rpc_error_code(error.kind),
                message: error.message.clone(),
            }),
            id,
        }
    }
}

/// JSON-RPC error codes: the `-326xx` range is reserved by the spec for
/// protocol-level failures; gateway-specific failures use the `-32000`
/// "server error" band, one code per §7 `ErrorKind` relevant to A2A.
fn rpc_error_code(kind: ErrorKind) -> i64 {
    match kind {
        ErrorKind::InvalidRequest => -32602,
        ErrorKind::Unauthenticated => -32001,
        ErrorKind::Forbidden => -32002,
        ErrorKind::UnknownTask => -32010,
        ErrorKind::TaskNotCancelable => -32011,
        ErrorKind::TaskTerminal => -32012,
        ErrorKind::Cancelled => -32013,
        _ => -32000,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSendParams {
    task_id: Option<TaskId>,
    context_id: Option<String>,
    message: Message,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIdParams {
    task_id: TaskId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksGetParams {
    task_id: TaskId,
    #[serde(default = "default_true")]
    include_history: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksListFilterParams {
    context_id: Option<String>,
    status: Option<TaskStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_after: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksListParams {
    #[serde(default)]
    filter: TasksListFilterParams,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushSetParams {
    task_id: TaskId,
    config: PushConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushDeleteParams {
    task_id: TaskId,
    url: Option<String>,
}

fn invalid_params(method: &str, err: serde_json::Error) -> GatewayError {
    GatewayError::new(ErrorKind::InvalidRequest, format!("invalid params for {method}: {err}"))
}

/// Dispatches every §4.9 method except the two streaming ones.
pub async fn dispatch(engine: &Arc<TaskEngine>, method: &str, params: Value, agent_card: &AgentCardConfig) -> Result<Value, GatewayError> {
    match method {
        METHOD_MESSAGE_SEND => {
            let params: MessageSendParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            let task = engine.message_send(params.task_id, params.context_id, params.message).await?;
            Ok(serde_json::to_value(task).expect("Task serializes"))
        }
        METHOD_TASKS_GET => {
            let params: TasksGetParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            let task = engine.get_task(&params.task_id, params.include_history).await?;
            Ok(serde_json::to_value(task).expect("Task serializes"))
        }
        METHOD_TASKS_LIST => {
            let params: TasksListParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            let filter = TaskFilter {
                context_id: params.filter.context_id,
                status: params.filter.status,
                updated_after: params.filter.updated_after,
            };
            let page = engine.list_tasks(&filter, params.cursor.as_deref())?;
            Ok(serde_json::json!({
                "items": page.items,
                "nextCursor": page.next_cursor,
            }))
        }
        METHOD_TASKS_CANCEL => {
            let params: TaskIdParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            let task = engine.cancel_task(&params.task_id).await?;
            Ok(serde_json::to_value(task).expect("Task serializes"))
        }
        METHOD_PUSH_SET => {
            let params: PushSetParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            let config = engine.set_push_config(&params.task_id, params.config).await?;
            Ok(serde_json::to_value(config).expect("PushConfig serializes"))
        }
        METHOD_PUSH_GET => {
            let params: TaskIdParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            let config = engine.get_push_config(&params.task_id).await?;
            Ok(config.map(|c| serde_json::to_value(c).expect("PushConfig serializes")).unwrap_or(Value::Null))
        }
        METHOD_PUSH_DELETE => {
            let params: PushDeleteParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            engine.delete_push_config(&params.task_id, params.url.as_deref()).await?;
            Ok(serde_json::json!({ "ok": true }))
        }
        METHOD_AGENT_CARD => Ok(serde_json::to_value(build_agent_card(agent_card)).expect("AgentCard serializes")),
        other => Err(GatewayError::new(ErrorKind::InvalidRequest, format!("unknown method: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStreamParams {
    task_id: Option<TaskId>,
    context_id: Option<String>,
    message: Message,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResubscribeParams {
    task_id: TaskId,
    #[serde(default)]
    last_event_id: Option<u64>,
}

/// Dispatches `message/stream` and `tasks/resubscribe`, the two methods
/// whose result is an SSE event stream rather than a single JSON value.
pub async fn stream_dispatch(
    engine: &Arc<TaskEngine>,
    method: &str,
    params: Value,
) -> Result<Pin<Box<dyn Stream<Item = TaskEvent> + Send>>, GatewayError> {
    match method {
        METHOD_MESSAGE_STREAM => {
            let params: MessageStreamParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            engine.message_stream(params.task_id, params.context_id, params.message).await
        }
        METHOD_TASKS_RESUBSCRIBE => {
            let params: ResubscribeParams = serde_json::from_value(params).map_err(|err| invalid_params(method, err))?;
            engine.resubscribe(&params.task_id, params.last_event_id).await
        }
        other => Err(GatewayError::new(ErrorKind::InvalidRequest, format!("unknown streaming method: {other}"))),
    }
}
