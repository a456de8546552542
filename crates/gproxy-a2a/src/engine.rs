//! The A2A Task Engine (§4.9): lifecycle state machine, per-task event log,
//! subscription, and push delivery triggers. Grounded on
//! `examples/other_examples/e4b6424e_mapleaiorg-maple...` for the
//! task/status/message/artifact shapes and on the teacher's
//! `events::EventHub` (`DashMap`/`RwLock`-guarded state, `tokio::sync::broadcast`
//! fan-out to subscribers) for the concurrency idiom, generalized from one
//! hub-wide channel to one channel per task so `message/stream` and
//! `tasks/resubscribe` only see events for the task they asked about.

use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use futures_core::Stream;
use gproxy_provider_core::context::CancelSignal;
use gproxy_provider_core::error::{ErrorKind, GatewayError};
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::dispatch::{TaskDispatch, TaskDispatchOutcome};
use crate::model::{
    Artifact, ContextId, Message, PushConfig, Role, Task, TaskEvent, TaskEventBody, TaskFilter, TaskId, TaskPage, TaskStatus, TaskSummary,
};
use crate::push::PushDispatcher;

const EVENT_LOG_RETENTION: usize = 500;
const LIST_PAGE_SIZE: usize = 50;
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct TaskRecord {
    task: Task,
    events: Vec<TaskEvent>,
    next_seq: u64,
}

impl TaskRecord {
    fn push_event(&mut self, body: TaskEventBody, now: OffsetDateTime) -> TaskEvent {
        let event = TaskEvent {
            task_id: self.task.task_id.clone(),
            seq: self.next_seq,
            at: now,
            body,
        };
        self.next_seq += 1;
        self.events.push(event.clone());
        if self.events.len() > EVENT_LOG_RETENTION {
            let overflow = self.events.len() - EVENT_LOG_RETENTION;
            self.events.drain(0..overflow);
        }
        event
    }
}

#[derive(Debug, Clone)]
pub struct TaskEngineConfig {
    pub max_concurrent_tasks: usize,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self { max_concurrent_tasks: 256 }
    }
}

pub struct TaskEngine {
    tasks: DashMap<TaskId, RwLock<TaskRecord>>,
    subscribers: DashMap<TaskId, broadcast::Sender<TaskEvent>>,
    inflight: DashMap<TaskId, CancelSignal>,
    dispatch: Arc<dyn TaskDispatch>,
    push: Arc<PushDispatcher>,
    config: TaskEngineConfig,
}

impl TaskEngine {
    pub fn new(dispatch: Arc<dyn TaskDispatch>, push: Arc<PushDispatcher>, config: TaskEngineConfig) -> Self {
        Self {
            tasks: DashMap::new(),
            subscribers: DashMap::new(),
            inflight: DashMap::new(),
            dispatch,
            push,
            config,
        }
    }

    fn create_task(&self, context_id: Option<ContextId>, now: OffsetDateTime) -> Result<TaskId, GatewayError> {
        if self.tasks.len() >= self.config.max_concurrent_tasks {
            return Err(GatewayError::new(ErrorKind::Internal, "task engine at max concurrent task capacity"));
        }
        let id = Uuid::new_v4().to_string();
        let task = Task {
            task_id: id.clone(),
            context_id: context_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            status: TaskStatus::Submitted,
            history: Vec::new(),
            artifacts: Vec::new(),
            push_configs: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(id.clone(), RwLock::new(TaskRecord { task, events: Vec::new(), next_seq: 0 }));
        Ok(id)
    }

    fn sender_for(&self, task_id: &TaskId) -> broadcast::Sender<TaskEvent> {
        self.subscribers
            .entry(task_id.clone())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Delivers the `TaskEvent` that caused this call, not a `Task`
    /// snapshot — §8 requires a receiver be able to dedupe by
    /// `(taskId, seq)`, which only the event carries.
    fn notify_push(&self, task: &Task, event: &TaskEvent) {
        if task.push_configs.is_empty() {
            return;
        }
        match serde_json::to_vec(event) {
            Ok(body) => self.push.notify(&task.task_id, &task.push_configs, body),
            Err(err) => tracing::warn!(task_id = %task.task_id, error = %err, "failed to serialize task event for push delivery"),
        }
    }

    /// `message/send` (§4.9). Creates a task if `task_id` is absent, else
    /// continues an existing one. Runs the inbound message through the
    /// injected [`TaskDispatch`], racing it against a caller-triggered
    /// `tasks/cancel` so cancellation during dispatch still lands cleanly.
    pub async fn message_send(&self, task_id: Option<TaskId>, context_id: Option<ContextId>, message: Message) -> Result<Task, GatewayError> {
        if !matches!(message.role, Role::User) {
            return Err(GatewayError::new(ErrorKind::InvalidRequest, "message/send requires a user-role message"));
        }

        let now = OffsetDateTime::now_utc();
        let task_id = match task_id {
            Some(id) => {
                let entry = self.tasks.get(&id).ok_or_else(|| unknown_task(&id))?;
                let record = entry.read().await;
                if record.task.status.is_terminal() {
                    return Err(GatewayError::new(ErrorKind::TaskTerminal, "task is in a terminal state"));
                }
                id
            }
            None => self.create_task(context_id, now)?,
        };

        let (task_snapshot, message_event, transition_event) = {
            let entry = self.tasks.get(&task_id).expect("just inserted or looked up above");
            let mut record = entry.write().await;
            record.task.history.push(message.clone());
            let message_event = record.push_event(TaskEventBody::Message { message: message.clone() }, now);
            let _ = self.sender_for(&task_id).send(message_event.clone());
            let transition_event = self.transition(&mut record, TaskStatus::Working, now);
            record.task.updated_at = now;
            (record.task.clone(), message_event, transition_event)
        };
        self.notify_push(&task_snapshot, &message_event);
        if let Some(event) = &transition_event {
            self.notify_push(&task_snapshot, event);
        }

        let cancel = CancelSignal::new();
        self.inflight.insert(task_id.clone(), cancel.clone());
        let outcome = tokio::select! {
            result = self.dispatch.dispatch_task_message(&task_snapshot, &message) => Some(result),
            _ = cancel.cancelled() => None,
        };
        self.inflight.remove(&task_id);

        let Some(outcome) = outcome else {
            // tasks/cancel already moved the task to `cancelled` and emitted
            // its own event; nothing further to record here.
            return self.get_task(&task_id, true).await;
        };

        let now = OffsetDateTime::now_utc();
        let entry = self.tasks.get(&task_id).expect("task present for the duration of dispatch");
        let mut record = entry.write().await;
        let mut step_events: Vec<TaskEvent> = Vec::new();
        match outcome {
            Ok(TaskDispatchOutcome::Completed { message, artifacts }) => {
                for (index, artifact) in artifacts.into_iter().enumerate() {
                    let artifact = Artifact { index: index as u32, ..artifact };
                    record.task.artifacts.push(artifact.clone());
                    let event = record.push_event(TaskEventBody::ArtifactChunk { artifact }, now);
                    let _ = self.sender_for(&task_id).send(event.clone());
                    step_events.push(event);
                }
                record.task.history.push(message.clone());
                let event = record.push_event(TaskEventBody::Message { message }, now);
                let _ = self.sender_for(&task_id).send(event.clone());
                step_events.push(event);
                step_events.extend(self.transition(&mut record, TaskStatus::Completed, now));
            }
            Ok(TaskDispatchOutcome::InputRequired { message }) => {
                record.task.history.push(message.clone());
                let event = record.push_event(TaskEventBody::Message { message }, now);
                let _ = self.sender_for(&task_id).send(event.clone());
                step_events.push(event);
                step_events.extend(self.transition(&mut record, TaskStatus::InputRequired, now));
            }
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err.message, "a2a dispatch failed");
                step_events.extend(self.transition(&mut record, TaskStatus::Failed, now));
            }
        }
        record.task.updated_at = now;
        let task = record.task.clone();
        drop(record);
        for event in &step_events {
            self.notify_push(&task, event);
        }
        Ok(task)
    }

    /// `message/stream` (§4.9): a live subscription over the events one
    /// `message_send` call produces, starting before dispatch so no event is
    /// missed. Ends when the task reaches a terminal status.
    pub async fn message_stream(
        self: &Arc<Self>,
        task_id: Option<TaskId>,
        context_id: Option<ContextId>,
        message: Message,
    ) -> Result<Pin<Box<dyn Stream<Item = TaskEvent> + Send>>, GatewayError> {
        // Resolve (or mint) the task id up front so the subscriber is wired
        // before `message_send` starts pushing events — otherwise the
        // earliest events would be lost to a not-yet-subscribed channel.
        let resolved = match task_id {
            Some(id) => {
                if self.tasks.get(&id).is_none() {
                    return Err(unknown_task(&id));
                }
                id
            }
            None => self.create_task(context_id, OffsetDateTime::now_utc())?,
        };
        let receiver = self.sender_for(&resolved).subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| item.ok());

        let engine = Arc::clone(self);
        let forward_task_id = resolved.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.message_send(Some(forward_task_id.clone()), None, message).await {
                tracing::warn!(task_id = %forward_task_id, error = %err.message, "message/stream dispatch failed");
            }
        });

        Ok(Box::pin(stream))
    }

    pub async fn get_task(&self, task_id: &TaskId, with_history: bool) -> Result<Task, GatewayError> {
        let entry = self.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        let record = entry.read().await;
        let mut task = record.task.clone();
        if !with_history {
            task.history.clear();
        }
        Ok(task)
    }

    pub fn list_tasks(&self, filter: &TaskFilter, cursor: Option<&str>) -> Result<TaskPage, GatewayError> {
        let mut summaries: Vec<TaskSummary> = Vec::new();
        for entry in self.tasks.iter() {
            // `try_read` is safe here: list is best-effort over a snapshot,
            // and a task mid-mutation just appears with its pre-mutation
            // state for one page, never torn.
            if let Ok(record) = entry.value().try_read() {
                if filter.matches(&record.task) {
                    summaries.push(TaskSummary::from(&record.task));
                }
            }
        }
        summaries.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        let start = match cursor {
            None => 0,
            Some(cursor) => summaries
                .iter()
                .position(|summary| summary.task_id == cursor)
                .map(|index| index + 1)
                .ok_or_else(|| GatewayError::new(ErrorKind::InvalidRequest, "invalid cursor"))?,
        };
        let end = (start + LIST_PAGE_SIZE).min(summaries.len());
        let next_cursor = if end < summaries.len() { Some(summaries[end - 1].task_id.clone()) } else { None };
        Ok(TaskPage {
            items: summaries[start..end].to_vec(),
            next_cursor,
        })
    }

    /// `tasks/cancel` (§4.9, §5): transitions the task first, then cancels
    /// any in-flight dispatch for it.
    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<Task, GatewayError> {
        let entry = self.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        let now = OffsetDateTime::now_utc();
        let (task, event) = {
            let mut record = entry.write().await;
            if record.task.status.is_terminal() {
                return Err(GatewayError::new(ErrorKind::TaskNotCancelable, "task is already in a terminal state"));
            }
            let event = self.transition(&mut record, TaskStatus::Cancelled, now);
            record.task.updated_at = now;
            (record.task.clone(), event)
        };
        if let Some((_, cancel)) = self.inflight.remove(task_id) {
            cancel.cancel();
        }
        if let Some(event) = &event {
            self.notify_push(&task, event);
        }
        Ok(task)
    }

    /// `tasks/resubscribe` (§4.9): replays the task's event log from
    /// `last_seen_seq` (exclusive) then continues live.
    pub async fn resubscribe(&self, task_id: &TaskId, last_seen_seq: Option<u64>) -> Result<Pin<Box<dyn Stream<Item = TaskEvent> + Send>>, GatewayError> {
        let entry = self.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        let (backlog, is_terminal) = {
            let record = entry.read().await;
            if record.task.status.is_terminal() {
                return Err(GatewayError::new(ErrorKind::TaskTerminal, "task has already reached a terminal state"));
            }
            let floor = last_seen_seq.map(|seq| seq + 1).unwrap_or(0);
            let backlog: Vec<TaskEvent> = record.events.iter().filter(|event| event.seq >= floor).cloned().collect();
            (backlog, record.task.status.is_terminal())
        };
        debug_assert!(!is_terminal);

        let live = self.sender_for(task_id).subscribe();
        let live_stream = BroadcastStream::new(live).filter_map(|item| item.ok());
        Ok(Box::pin(tokio_stream::iter(backlog).chain(live_stream)))
    }

    pub async fn set_push_config(&self, task_id: &TaskId, config: PushConfig) -> Result<PushConfig, GatewayError> {
        if !config.url.starts_with("https://") && !config.url.starts_with("http://") {
            return Err(GatewayError::new(ErrorKind::InvalidRequest, "push config url must be http(s)"));
        }
        let entry = self.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        let mut record = entry.write().await;
        record.task.push_configs.retain(|existing| existing.url != config.url);
        record.task.push_configs.push(config.clone());
        Ok(config)
    }

    pub async fn get_push_config(&self, task_id: &TaskId) -> Result<Option<PushConfig>, GatewayError> {
        let entry = self.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        let record = entry.read().await;
        Ok(record.task.push_configs.first().cloned())
    }

    pub async fn delete_push_config(&self, task_id: &TaskId, url: Option<&str>) -> Result<(), GatewayError> {
        let entry = self.tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;
        let mut record = entry.write().await;
        match url {
            Some(url) => record.task.push_configs.retain(|config| config.url != url),
            None => record.task.push_configs.clear(),
        }
        Ok(())
    }

    /// Applies `next` if (and only if) the §4.9 transition table permits it
    /// from the task's current status; a no-op if already there. Any other
    /// edge is a programming error in the caller and is rejected rather
    /// than silently coerced. Returns the `StatusUpdate` event it recorded,
    /// so callers can hand it on to push delivery.
    fn transition(&self, record: &mut TaskRecord, next: TaskStatus, now: OffsetDateTime) -> Option<TaskEvent> {
        let current = record.task.status;
        if current == next {
            return None;
        }
        if !current.can_transition_to(next) {
            tracing::error!(task_id = %record.task.task_id, from = ?current, to = ?next, "rejected illegal task status transition");
            return None;
        }
        record.task.status = next;
        let event = record.push_event(TaskEventBody::StatusUpdate { status: next }, now);
        let _ = self.sender_for(&record.task.task_id).send(event.clone());
        Some(event)
    }
}

fn unknown_task(task_id: &TaskId) -> GatewayError {
    GatewayError::new(ErrorKind::UnknownTask, format!("no such task: {task_id}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::model::Part;
    use crate::push::InMemoryDeliveryLog;

    fn test_engine(dispatch: Arc<dyn TaskDispatch>) -> Arc<TaskEngine> {
        let push = Arc::new(PushDispatcher::new(
            1,
            Arc::from(b"test-secret".as_slice()),
            reqwest::Client::new(),
            Arc::new(InMemoryDeliveryLog::new()),
        ));
        Arc::new(TaskEngine::new(dispatch, push, TaskEngineConfig::default()))
    }

    fn user_message(text: &str) -> Message {
        Message::text(Role::User, text, OffsetDateTime::now_utc())
    }

    enum Script {
        Completed,
        InputRequired,
    }

    /// A scripted [`TaskDispatch`] double: plays back one outcome per call,
    /// in order (the same "mock used in tests" collaborator idiom as
    /// `gproxy-core`'s `MockProvider`).
    struct ScriptedDispatch {
        calls: AtomicUsize,
        script: Vec<Script>,
    }

    impl ScriptedDispatch {
        fn new(script: Vec<Script>) -> Self {
            Self { calls: AtomicUsize::new(0), script }
        }
    }

    #[async_trait]
    impl TaskDispatch for ScriptedDispatch {
        async fn dispatch_task_message(&self, _task: &Task, _message: &Message) -> Result<TaskDispatchOutcome, GatewayError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script[index] {
                Script::Completed => Ok(TaskDispatchOutcome::Completed {
                    message: Message::text(Role::Assistant, "done", OffsetDateTime::now_utc()),
                    artifacts: vec![Artifact {
                        name: "result".to_string(),
                        parts: vec![Part::Text { text: "ok".to_string() }],
                        index: 0,
                        last_chunk: true,
                    }],
                }),
                Script::InputRequired => Ok(TaskDispatchOutcome::InputRequired {
                    message: Message::text(Role::Assistant, "need more detail", OffsetDateTime::now_utc()),
                }),
            }
        }
    }

    /// Never resolves — lets a test race `tasks/cancel` against a dispatch
    /// that is still in flight.
    struct HangingDispatch;

    #[async_trait]
    impl TaskDispatch for HangingDispatch {
        async fn dispatch_task_message(&self, _task: &Task, _message: &Message) -> Result<TaskDispatchOutcome, GatewayError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn message_send_without_task_id_creates_and_completes_a_task() {
        let engine = test_engine(Arc::new(ScriptedDispatch::new(vec![Script::Completed])));
        let task = engine.message_send(None, None, user_message("hi")).await.unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.artifacts.len(), 1);
        assert_eq!(task.history.len(), 2, "the user message and the agent reply");
    }

    #[tokio::test]
    async fn input_required_then_continues_to_completed() {
        let engine = test_engine(Arc::new(ScriptedDispatch::new(vec![Script::InputRequired, Script::Completed])));

        let task = engine.message_send(None, None, user_message("start")).await.unwrap();
        assert_eq!(task.status, TaskStatus::InputRequired);

        let task = engine.message_send(Some(task.task_id), None, user_message("more detail")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    // Property #4: status is monotone on the terminal axis — once a task
    // reaches `completed`, no further transition is accepted.
    #[tokio::test]
    async fn completed_task_rejects_further_sends_and_cancels() {
        let engine = test_engine(Arc::new(ScriptedDispatch::new(vec![Script::Completed])));
        let task = engine.message_send(None, None, user_message("hi")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        let err = engine.message_send(Some(task.task_id.clone()), None, user_message("hi again")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskTerminal);

        let err = engine.cancel_task(&task.task_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskNotCancelable);

        // And the task itself never moved off `completed` in response to
        // either rejected call.
        let reloaded = engine.get_task(&task.task_id, false).await.unwrap();
        assert_eq!(reloaded.status, TaskStatus::Completed);
    }

    // Property #5: per-task event `seq` is dense and strictly increasing.
    #[tokio::test]
    async fn task_events_have_dense_strictly_increasing_seq() {
        let engine = test_engine(Arc::new(ScriptedDispatch::new(vec![Script::Completed])));
        let mut stream = engine.message_stream(None, None, user_message("hi")).await.unwrap();

        let mut seqs = Vec::new();
        loop {
            let event = stream.next().await.expect("stream ended before the task reached a terminal status");
            let reached_terminal = matches!(&event.body, TaskEventBody::StatusUpdate { status } if status.is_terminal());
            seqs.push(event.seq);
            if reached_terminal {
                break;
            }
        }

        assert!(seqs.len() >= 4, "expected at least message+working+artifact+completed events: {seqs:?}");
        for window in seqs.windows(2) {
            assert_eq!(window[1], window[0] + 1, "seq must be dense and strictly increasing: {seqs:?}");
        }
    }

    // S5 — cancelling a task mid-dispatch transitions it to `cancelled`
    // immediately, and it stays rejected afterward rather than reopening.
    #[tokio::test]
    async fn cancel_mid_dispatch_transitions_to_cancelled() {
        let engine = test_engine(Arc::new(HangingDispatch));
        let message = user_message("please help");

        let send_engine = engine.clone();
        let send_message = message.clone();
        let handle = tokio::spawn(async move { send_engine.message_send(None, None, send_message).await });

        // Give message_send a moment to create the task and enter dispatch.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let task_id = engine
            .list_tasks(&TaskFilter::default(), None)
            .unwrap()
            .items
            .into_iter()
            .next()
            .expect("message_send already created its task")
            .task_id;

        let cancelled = engine.cancel_task(&task_id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);

        let returned = handle.await.unwrap().unwrap();
        assert_eq!(returned.status, TaskStatus::Cancelled);

        let err = engine.message_send(Some(task_id.clone()), None, message).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskTerminal);

        let err = engine.cancel_task(&task_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskNotCancelable);
    }

    // Property #8: a push receiver can dedupe deliveries by `(taskId, seq)`
    // — which requires the delivered payload to carry the event, not a bare
    // `Task` snapshot that has no `seq` of its own.
    #[tokio::test]
    async fn push_delivery_carries_the_originating_event_with_its_seq() {
        use crate::push::tests::mock_server::MockServer;

        let server = MockServer::start(vec![200, 200, 200, 200]).await;
        let push = Arc::new(PushDispatcher::new(
            1,
            Arc::from(b"test-secret".as_slice()),
            reqwest::Client::new(),
            Arc::new(InMemoryDeliveryLog::new()),
        ));
        let engine = Arc::new(TaskEngine::new(Arc::new(ScriptedDispatch::new(vec![Script::Completed])), push, TaskEngineConfig::default()));

        let task_id = engine.create_task(None, OffsetDateTime::now_utc()).unwrap();
        engine
            .set_push_config(
                &task_id,
                PushConfig {
                    url: server.url(),
                    token: None,
                    headers: Default::default(),
                },
            )
            .await
            .unwrap();

        engine.message_send(Some(task_id.clone()), None, user_message("hi")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let requests = server.requests().await;
        assert!(!requests.is_empty(), "expected at least one push delivery");

        let mut seen_seqs = std::collections::HashSet::new();
        for request in &requests {
            let event: TaskEvent = serde_json::from_slice(&request.body).expect("push body must deserialize as a TaskEvent");
            assert_eq!(event.task_id, task_id);
            seen_seqs.insert(event.seq);
        }
        assert!(seen_seqs.len() > 1, "expected distinct seqs across deliveries, got {seen_seqs:?}");
    }

    #[tokio::test]
    async fn unknown_task_id_is_rejected_on_every_entry_point() {
        let engine = test_engine(Arc::new(ScriptedDispatch::new(vec![])));
        let missing = "no-such-task".to_string();

        assert_eq!(engine.get_task(&missing, true).await.unwrap_err().kind, ErrorKind::UnknownTask);
        assert_eq!(engine.cancel_task(&missing).await.unwrap_err().kind, ErrorKind::UnknownTask);
        assert_eq!(
            engine.message_send(Some(missing.clone()), None, user_message("hi")).await.unwrap_err().kind,
            ErrorKind::UnknownTask
        );
        assert_eq!(engine.resubscribe(&missing, None).await.unwrap_err().kind, ErrorKind::UnknownTask);
    }
}
