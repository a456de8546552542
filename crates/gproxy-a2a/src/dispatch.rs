//! The seam between the Task Engine and the request dispatch engine
//! (spec.md §4.9: "A2A traffic enters the same Dispatcher via a wrapping
//! Task Engine"). Kept as a narrow trait rather than a direct dependency on
//! `gproxy-core::Dispatcher` — the same `CredentialRepository`/`EventSink`
//! idiom `gproxy-core::auth` and the teacher's `events::EventSink` already
//! use to decouple a consumer from its concrete collaborator. `apps/gproxy`
//! supplies the concrete implementation that builds a `DispatchRequest` from
//! the task's message history and calls `Dispatcher::dispatch`.

use async_trait::async_trait;
use gproxy_provider_core::GatewayError;

use crate::model::{Artifact, Message, Task};

/// Outcome of handing one inbound `Message` to the dispatch engine.
pub enum TaskDispatchOutcome {
    /// The adapter produced a final answer; the task moves to `completed`.
    Completed { message: Message, artifacts: Vec<Artifact> },
    /// The adapter needs more input from the caller (e.g. a tool call);
    /// the task moves to `input_required`.
    InputRequired { message: Message },
}

#[async_trait]
pub trait TaskDispatch: Send + Sync {
    /// Runs `message` (the latest entry appended to `task.history`) through
    /// the dispatch engine and reports how the task should advance.
    /// `Err` moves the task to `failed`; cancellation is reported by the
    /// caller racing this future against its own `CancelSignal`, not by a
    /// variant here (§5 cancellation semantics).
    async fn dispatch_task_message(&self, task: &Task, message: &Message) -> Result<TaskDispatchOutcome, GatewayError>;
}
