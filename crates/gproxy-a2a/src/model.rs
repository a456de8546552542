//! A2A data model (§4.9, §3 "Task").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type TaskId = String;
pub type ContextId = String;

/// §4.9 state machine. Transitions are checked by [`TaskStatus::can_transition_to`];
/// any other edge is a programming error and must be rejected, never silently
/// coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Submitted, Working)
                | (Submitted, Cancelled)
                | (Working, InputRequired)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, Cancelled)
                | (InputRequired, Working)
                | (InputRequired, Cancelled)
        )
    }
}

/// §3 `Message.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A message/artifact part (§3: "tagged variants {text, file(uri,mime),
/// data(json), function_call, function_response}"). `Data` carries
/// arbitrary structured tool/application payloads the spec leaves opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    File {
        name: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Data {
        data: serde_json::Value,
    },
    FunctionCall {
        name: String,
        arguments: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    FunctionResponse {
        name: String,
        response: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            role,
            parts: vec![Part::Text { text: text.into() }],
            timestamp: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    pub parts: Vec<Part>,
    pub index: u32,
    pub last_chunk: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A unit of work with a durable, subscribable lifecycle (§3 glossary).
/// Invariants: `status` is monotone on the terminal axis, `history[0].role
/// == User`, `updated_at >= created_at` — enforced by [`crate::engine::TaskEngine`],
/// never by callers mutating this struct directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    pub context_id: ContextId,
    pub status: TaskStatus,
    pub history: Vec<Message>,
    pub artifacts: Vec<Artifact>,
    pub push_configs: Vec<PushConfig>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub context_id: ContextId,
    pub status: TaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            context_id: task.context_id.clone(),
            status: task.status,
            updated_at: task.updated_at,
        }
    }
}

/// `tasks/list` filter (SPEC_FULL.md `tasks/list` filtering Supplement —
/// free-text search over message content is deliberately not implemented).
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub context_id: Option<ContextId>,
    pub status: Option<TaskStatus>,
    pub updated_after: Option<OffsetDateTime>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(context_id) = &self.context_id {
            if &task.context_id != context_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(updated_after) = self.updated_after {
            if task.updated_at <= updated_after {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct TaskPage {
    pub items: Vec<TaskSummary>,
    pub next_cursor: Option<String>,
}

/// Body of one `message/stream` / `tasks/resubscribe` event (§4.9). Dense,
/// strictly increasing `seq` within a task (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEventBody {
    StatusUpdate { status: TaskStatus },
    ArtifactChunk { artifact: Artifact },
    Message { message: Message },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub seq: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub body: TaskEventBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
}
