//! Task Repository (§6: `TaskRepository.{save, load, list, appendEvent,
//! readEventsSince}`). The A2A Task Engine (`gproxy-a2a::engine`) keeps its
//! own in-memory `DashMap<TaskId, RwLock<TaskRecord>>` plus per-task
//! broadcast channels for live subscription — that state doesn't decompose
//! cleanly through a narrow save/load interface, so the engine does not
//! delegate to this trait today (see DESIGN.md). This module still
//! provides the named collaborator and an in-memory implementation so a
//! durable backend could be wired in without changing the engine's public
//! API, matching the teacher's pattern of keeping a storage trait
//! independent of the component that would eventually use it.

use std::sync::Mutex;

use dashmap::DashMap;
use gproxy_a2a::model::{Task, TaskEvent, TaskFilter, TaskId, TaskPage, TaskSummary};

const LIST_PAGE_SIZE: usize = 50;

pub trait TaskRepository: Send + Sync {
    fn save(&self, task: Task);
    fn load(&self, task_id: &TaskId) -> Option<Task>;
    fn list(&self, filter: &TaskFilter, cursor: Option<&str>) -> TaskPage;
    fn append_event(&self, event: TaskEvent);
    fn read_events_since(&self, task_id: &TaskId, since_seq: Option<u64>) -> Vec<TaskEvent>;
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: DashMap<TaskId, Task>,
    events: DashMap<TaskId, Mutex<Vec<TaskEvent>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn save(&self, task: Task) {
        self.tasks.insert(task.task_id.clone(), task);
    }

    fn load(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.get(task_id).map(|entry| entry.clone())
    }

    fn list(&self, filter: &TaskFilter, cursor: Option<&str>) -> TaskPage {
        let mut matching: Vec<TaskSummary> = self
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|task| filter.matches(task))
            .map(|task| TaskSummary::from(&task))
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.task_id.cmp(&b.task_id)));

        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + LIST_PAGE_SIZE).min(matching.len());
        let items = if start < matching.len() { matching[start..end].to_vec() } else { Vec::new() };
        let next_cursor = if end < matching.len() { Some(end.to_string()) } else { None };

        TaskPage { items, next_cursor }
    }

    fn append_event(&self, event: TaskEvent) {
        let entry = self.events.entry(event.task_id.clone()).or_default();
        entry.lock().expect("task event log lock poisoned").push(event);
    }

    fn read_events_since(&self, task_id: &TaskId, since_seq: Option<u64>) -> Vec<TaskEvent> {
        let Some(entry) = self.events.get(task_id) else {
            return Vec::new();
        };
        let events = entry.lock().expect("task event log lock poisoned");
        match since_seq {
            Some(since) => events.iter().filter(|event| event.seq > since).cloned().collect(),
            None => events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use gproxy_a2a::model::{Role, TaskStatus};
    use time::OffsetDateTime;

    use super::*;

    fn task(id: &str) -> Task {
        let now = OffsetDateTime::now_utc();
        Task {
            task_id: id.to_string(),
            context_id: "ctx-1".to_string(),
            status: TaskStatus::Submitted,
            history: vec![],
            artifacts: vec![],
            push_configs: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let repo = InMemoryTaskRepository::new();
        repo.save(task("t1"));
        assert!(repo.load(&"t1".to_string()).is_some());
        assert!(repo.load(&"missing".to_string()).is_none());
    }

    #[test]
    fn events_since_filters_by_seq() {
        let repo = InMemoryTaskRepository::new();
        let now = OffsetDateTime::now_utc();
        for seq in 0..3 {
            repo.append_event(TaskEvent {
                task_id: "t1".to_string(),
                seq,
                at: now,
                body: gproxy_a2a::model::TaskEventBody::Message {
                    message: gproxy_a2a::model::Message::text(Role::Assistant, "hi", now),
                },
            });
        }
        assert_eq!(repo.read_events_since(&"t1".to_string(), Some(1)).len(), 1);
        assert_eq!(repo.read_events_since(&"t1".to_string(), None).len(), 3);
    }
}
