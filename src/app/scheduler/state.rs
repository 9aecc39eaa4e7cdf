//! Internal state of the download scheduler
//!
//! Two disjoint maps hold the tasks: `queue` for everything that is not
//! currently transferring (queued, paused, and inert terminal records) and
//! `active` for admitted transfers. A task id lives in exactly one of the
//! two at any instant. Runtime-only artifacts (cancellation tokens, per-task
//! hooks) are kept in side maps so the task records stay serializable.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::app::models::{
    DownloadStatus, DownloadTask, TaskHooks, TaskId, TaskSnapshot, TopicId,
};

/// Aggregate task counts by status, for diagnostics and the CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub queued: usize,
    pub downloading: usize,
    pub paused: usize,
    pub completed: usize,
    pub error: usize,
}

/// Mutable scheduler state, guarded by a single async mutex in the
/// scheduler
#[derive(Debug, Default)]
pub struct SchedulerState {
    /// Tasks not currently transferring, keyed by task id
    queue: HashMap<TaskId, DownloadTask>,
    /// Admitted transfers, keyed by task id
    active: HashMap<TaskId, DownloadTask>,
    /// Per-task hooks, runtime only
    hooks: HashMap<TaskId, TaskHooks>,
    /// Cancellation tokens for in-flight transfers
    tokens: HashMap<TaskId, CancellationToken>,
    /// Next raw task id
    next_task_id: u64,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            next_task_id: 1,
            ..Default::default()
        }
    }

    /// Allocate the next task id
    pub fn allocate_task_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    /// Number of transfers currently admitted
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Find the task for a topic, if any, searching active transfers first
    pub fn task_for_topic(&self, topic_id: &TopicId) -> Option<&DownloadTask> {
        self.active
            .values()
            .find(|t| &t.topic_id == topic_id)
            .or_else(|| self.queue.values().find(|t| &t.topic_id == topic_id))
    }

    /// Find the live (non-terminal, non-error) task for a topic
    pub fn live_task_for_topic(&self, topic_id: &TopicId) -> Option<&DownloadTask> {
        self.task_for_topic(topic_id)
            .filter(|t| t.status.is_live())
    }

    /// Drop any inert record (terminal or errored) for a topic, making room
    /// for a fresh enqueue
    pub fn supersede_topic(&mut self, topic_id: &TopicId) {
        let stale: Vec<TaskId> = self
            .queue
            .values()
            .filter(|t| &t.topic_id == topic_id && !t.status.is_live())
            .map(|t| t.id)
            .collect();
        for id in stale {
            debug!(task = %id, topic = %topic_id, "Superseding stale task record");
            self.queue.remove(&id);
            self.hooks.remove(&id);
        }
    }

    /// Insert a freshly created task into the queue map
    pub fn insert_new(&mut self, task: DownloadTask, hooks: TaskHooks) {
        self.hooks.insert(task.id, hooks);
        self.queue.insert(task.id, task);
    }

    /// Seed state from a restored snapshot
    ///
    /// All restored tasks land in the queue map (the store already
    /// reclassified in-flight records to paused) and the id counter moves
    /// past the highest restored id so creation order stays recoverable.
    pub fn load_snapshot(&mut self, snapshot: TaskSnapshot) {
        for (_, task) in snapshot {
            self.next_task_id = self.next_task_id.max(task.id.raw() + 1);
            self.queue.insert(task.id, task);
        }
    }

    /// Admit eligible tasks up to `bound` concurrent transfers
    ///
    /// Eligible tasks are the queued ones, ordered by priority descending
    /// then enqueue time ascending (stable FIFO among equal priority, task
    /// id as the final tie-break). Admitted tasks move to the active map
    /// with a fresh cancellation token and counters reset to zero; every
    /// start is a retry-from-scratch.
    ///
    /// Returns the admitted tasks paired with their tokens so the caller
    /// can spawn the transfers after releasing the state lock.
    pub fn admit(&mut self, bound: usize) -> Vec<(DownloadTask, CancellationToken)> {
        let mut admitted = Vec::new();
        if self.active.len() >= bound {
            return admitted;
        }

        let mut eligible: Vec<TaskId> = self
            .queue
            .values()
            .filter(|t| t.status == DownloadStatus::Queued)
            .map(|t| t.id)
            .collect();
        // Linear sort is fine at the expected scale (tens of tasks)
        eligible.sort_by(|a, b| {
            let ta = &self.queue[a];
            let tb = &self.queue[b];
            tb.priority
                .cmp(&ta.priority)
                .then(ta.created_at.cmp(&tb.created_at))
                .then(ta.id.cmp(&tb.id))
        });

        for id in eligible {
            if self.active.len() >= bound {
                break;
            }
            let mut task = match self.queue.remove(&id) {
                Some(t) => t,
                None => continue,
            };
            task.status = DownloadStatus::Downloading;
            task.reset_progress();
            task.error = None;

            let token = CancellationToken::new();
            self.tokens.insert(id, token.clone());
            debug!(task = %id, topic = %task.topic_id, "Admitted task");
            self.active.insert(id, task.clone());
            admitted.push((task, token));
        }
        admitted
    }

    /// Status of a task wherever it currently lives
    pub fn task_status(&self, task_id: &TaskId) -> Option<DownloadStatus> {
        self.active
            .get(task_id)
            .or_else(|| self.queue.get(task_id))
            .map(|t| t.status)
    }

    /// Mutable access to an admitted task
    pub fn active_task_mut(&mut self, task_id: &TaskId) -> Option<&mut DownloadTask> {
        self.active.get_mut(task_id)
    }

    /// Take an admitted task out of the active map, dropping its token
    pub fn take_active(&mut self, task_id: &TaskId) -> Option<DownloadTask> {
        self.tokens.remove(task_id);
        self.active.remove(task_id)
    }

    /// Fire the cancellation token of an in-flight transfer
    pub fn cancel_token(&mut self, task_id: &TaskId) {
        if let Some(token) = self.tokens.remove(task_id) {
            token.cancel();
        }
    }

    /// File an inert or suspended task back into the queue map
    pub fn file_in_queue(&mut self, task: DownloadTask) {
        debug_assert!(!self.active.contains_key(&task.id));
        self.queue.insert(task.id, task);
    }

    /// Mutable access to a task in the queue map
    pub fn queued_task_mut(&mut self, task_id: &TaskId) -> Option<&mut DownloadTask> {
        self.queue.get_mut(task_id)
    }

    /// Remove a task (and its runtime artifacts) from whichever map holds
    /// it, returning the record
    pub fn remove_task(&mut self, task_id: &TaskId) -> Option<DownloadTask> {
        self.hooks.remove(task_id);
        self.cancel_token(task_id);
        self.active
            .remove(task_id)
            .or_else(|| self.queue.remove(task_id))
    }

    /// Per-task hooks, if registered
    pub fn hooks_for(&self, task_id: &TaskId) -> Option<&TaskHooks> {
        self.hooks.get(task_id)
    }

    /// Suspend every in-flight transfer in one mutation (network-loss bulk
    /// pause): tokens fire, tasks move back to the queue map as paused.
    /// Returns how many transfers were suspended.
    pub fn bulk_pause_active(&mut self) -> usize {
        let ids: Vec<TaskId> = self.active.keys().copied().collect();
        let count = ids.len();
        for id in ids {
            self.cancel_token(&id);
            if let Some(mut task) = self.active.remove(&id) {
                task.status = DownloadStatus::Paused;
                self.queue.insert(id, task);
            }
        }
        count
    }

    /// Promote every paused task to queued. Returns how many moved.
    pub fn requeue_paused(&mut self) -> usize {
        let mut moved = 0;
        for task in self.queue.values_mut() {
            if task.status == DownloadStatus::Paused {
                task.status = DownloadStatus::Queued;
                moved += 1;
            }
        }
        moved
    }

    /// Immutable merged snapshot of the queue and active maps, keyed by
    /// topic
    pub fn snapshot(&self) -> TaskSnapshot {
        self.queue
            .values()
            .chain(self.active.values())
            .map(|t| (t.topic_id.clone(), t.clone()))
            .collect()
    }

    /// Aggregate counts by status
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        for task in self.queue.values().chain(self.active.values()) {
            match task.status {
                DownloadStatus::Queued => stats.queued += 1,
                DownloadStatus::Downloading => stats.downloading += 1,
                DownloadStatus::Paused => stats.paused += 1,
                DownloadStatus::Completed => stats.completed += 1,
                DownloadStatus::Error => stats.error += 1,
                DownloadStatus::Cancelled => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::TaskHooks;
    use chrono::{Duration, Utc};

    fn push_task(state: &mut SchedulerState, topic: &str, priority: i32) -> TaskId {
        let id = state.allocate_task_id();
        let task = DownloadTask::new(
            id,
            TopicId::from(topic),
            format!("https://example.com/{}", topic),
            1000,
            priority,
        );
        state.insert_new(task, TaskHooks::default());
        id
    }

    #[test]
    fn test_admission_respects_bound() {
        let mut state = SchedulerState::new();
        for i in 0..5 {
            push_task(&mut state, &format!("T{}", i), 1);
        }

        let admitted = state.admit(2);
        assert_eq!(admitted.len(), 2);
        assert_eq!(state.active_count(), 2);

        // A second pass with the bound already reached admits nothing
        assert!(state.admit(2).is_empty());
    }

    #[test]
    fn test_admission_orders_by_priority_then_age() {
        let mut state = SchedulerState::new();
        let low = push_task(&mut state, "low", 5);
        let high = push_task(&mut state, "high", 10);

        // Low priority was enqueued earlier, high priority still wins
        let admitted = state.admit(1);
        assert_eq!(admitted[0].0.id, high);

        let admitted = state.admit(2);
        assert_eq!(admitted[0].0.id, low);
    }

    #[test]
    fn test_admission_fifo_among_equal_priority() {
        let mut state = SchedulerState::new();
        let first = push_task(&mut state, "first", 3);
        let second = push_task(&mut state, "second", 3);
        // Force distinct creation times in the right order
        state.queued_task_mut(&second).unwrap().created_at =
            Utc::now() + Duration::seconds(1);

        let admitted = state.admit(1);
        assert_eq!(admitted[0].0.id, first);
    }

    #[test]
    fn test_admission_resets_counters() {
        let mut state = SchedulerState::new();
        let id = push_task(&mut state, "T1", 1);
        state.queued_task_mut(&id).unwrap().record_progress(400);

        let admitted = state.admit(1);
        assert_eq!(admitted[0].0.downloaded_bytes, 0);
        assert_eq!(admitted[0].0.progress, 0.0);
    }

    #[test]
    fn test_task_in_exactly_one_map() {
        let mut state = SchedulerState::new();
        let id = push_task(&mut state, "T1", 1);

        state.admit(1);
        assert!(state.queued_task_mut(&id).is_none());
        assert!(state.active_task_mut(&id).is_some());

        let task = state.take_active(&id).unwrap();
        state.file_in_queue(task);
        assert!(state.queued_task_mut(&id).is_some());
        assert!(state.active_task_mut(&id).is_none());
    }

    #[test]
    fn test_bulk_pause_and_requeue() {
        let mut state = SchedulerState::new();
        push_task(&mut state, "T1", 1);
        push_task(&mut state, "T2", 1);
        state.admit(2);

        assert_eq!(state.bulk_pause_active(), 2);
        assert_eq!(state.active_count(), 0);
        assert_eq!(state.stats().paused, 2);

        assert_eq!(state.requeue_paused(), 2);
        assert_eq!(state.stats().queued, 2);
    }

    #[test]
    fn test_supersede_removes_only_inert_records() {
        let mut state = SchedulerState::new();
        let id = push_task(&mut state, "T1", 1);
        state.queued_task_mut(&id).unwrap().mark_failed("boom");

        state.supersede_topic(&TopicId::from("T1"));
        assert!(state.task_for_topic(&TopicId::from("T1")).is_none());

        let live = push_task(&mut state, "T1", 1);
        state.supersede_topic(&TopicId::from("T1"));
        assert_eq!(
            state.task_for_topic(&TopicId::from("T1")).unwrap().id,
            live
        );
    }

    #[test]
    fn test_load_snapshot_seeds_id_counter() {
        let mut state = SchedulerState::new();
        let mut snapshot = TaskSnapshot::new();
        let task = DownloadTask::new(
            TaskId::new(41),
            TopicId::from("T1"),
            "https://example.com/T1".to_string(),
            1000,
            1,
        );
        snapshot.insert(task.topic_id.clone(), task);

        state.load_snapshot(snapshot);
        assert_eq!(state.allocate_task_id(), TaskId::new(42));
    }

    #[test]
    fn test_snapshot_merges_both_maps() {
        let mut state = SchedulerState::new();
        push_task(&mut state, "T1", 1);
        push_task(&mut state, "T2", 1);
        state.admit(1);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
