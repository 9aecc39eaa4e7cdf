//! Core data models for the download manager
//!
//! This module defines the fundamental types shared across the scheduler,
//! transfer executor, and task store: identifiers, task status, the task
//! record itself, enqueue options, and the snapshot type delivered to
//! subscribers.
//!
//! `DownloadTask` is fully serializable; runtime-only artifacts such as
//! cancellation tokens and per-task hooks live in side maps owned by the
//! scheduler and are regenerated whenever a transfer (re)starts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a content bundle (lesson/quiz package), the unit a user
/// downloads for offline use
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    /// Create a topic id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TopicId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque identifier of one download attempt
///
/// Allocated from a monotonically increasing counter so that creation order
/// is recoverable; the counter is re-seeded above the highest persisted id
/// on restore.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Construct a task id from its raw counter value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Status of a download task
///
/// `Completed` and `Cancelled` are terminal; a task in either state is
/// inert but remains queryable until removed or superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Waiting for an execution slot
    Queued,
    /// Transfer in flight
    Downloading,
    /// Suspended by the user or by a network-loss bulk pause
    Paused,
    /// All bytes received and verified against the probed size
    Completed,
    /// Transfer failed; `DownloadTask::error` carries the reason
    Error,
    /// Aborted by the user
    Cancelled,
}

impl DownloadStatus {
    /// Check whether this status is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Cancelled)
    }

    /// Check whether a task in this status counts against the
    /// one-live-task-per-topic invariant
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Queued | DownloadStatus::Downloading | DownloadStatus::Paused
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Error => "error",
            DownloadStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// One attempt to download a topic, tracked by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Unique task identifier, generated at enqueue time
    pub id: TaskId,
    /// The content bundle being fetched
    pub topic_id: TopicId,
    /// Resolved fetch location for this task
    pub source_url: String,
    /// Current lifecycle status
    pub status: DownloadStatus,
    /// Fractional progress in `[0, 100]`
    pub progress: f64,
    /// Total size of the content bundle, from the size probe
    pub size_bytes: u64,
    /// Bytes received so far; never exceeds `size_bytes`
    pub downloaded_bytes: u64,
    /// Higher priority is served first
    pub priority: i32,
    /// Enqueue time, used as the tie-break among equal priorities
    pub created_at: DateTime<Utc>,
    /// Failure reason, present only when `status == Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadTask {
    /// Create a fresh task in `Queued` state
    pub fn new(
        id: TaskId,
        topic_id: TopicId,
        source_url: String,
        size_bytes: u64,
        priority: i32,
    ) -> Self {
        Self {
            id,
            topic_id,
            source_url,
            status: DownloadStatus::Queued,
            progress: 0.0,
            size_bytes,
            downloaded_bytes: 0,
            priority,
            created_at: Utc::now(),
            error: None,
        }
    }

    /// Record a progress update from the transfer executor
    ///
    /// Derives the percentage from the byte count and keeps both values
    /// monotonic within the current attempt.
    pub fn record_progress(&mut self, downloaded_bytes: u64) {
        let capped = downloaded_bytes.min(self.size_bytes);
        if capped < self.downloaded_bytes {
            return;
        }
        self.downloaded_bytes = capped;
        self.progress = if self.size_bytes == 0 {
            100.0
        } else {
            (capped as f64 / self.size_bytes as f64) * 100.0
        };
    }

    /// Reset counters for a retry-from-scratch attempt
    pub fn reset_progress(&mut self) {
        self.downloaded_bytes = 0;
        self.progress = 0.0;
    }

    /// Mark the task completed, pinning the byte counters to the total
    pub fn mark_completed(&mut self) {
        self.status = DownloadStatus::Completed;
        self.downloaded_bytes = self.size_bytes;
        self.progress = 100.0;
        self.error = None;
    }

    /// Mark the task failed with a reason
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = DownloadStatus::Error;
        self.error = Some(reason.into());
    }
}

/// Per-task progress callback: receives the fractional progress in `[0, 100]`
pub type ProgressHook = Arc<dyn Fn(f64) + Send + Sync>;

/// Per-task completion callback
pub type CompleteHook = Arc<dyn Fn() + Send + Sync>;

/// Per-task failure callback: receives the failure reason
pub type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional per-task hooks supplied at enqueue time
///
/// Hooks are runtime-only and never persisted; they are dropped together
/// with the task.
#[derive(Clone, Default)]
pub struct TaskHooks {
    pub on_progress: Option<ProgressHook>,
    pub on_complete: Option<CompleteHook>,
    pub on_error: Option<ErrorHook>,
}

impl fmt::Debug for TaskHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHooks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Options controlling a single enqueue request
#[derive(Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Scheduling priority; higher is served first
    pub priority: i32,
    /// Per-task hooks
    pub hooks: TaskHooks,
}

impl DownloadOptions {
    /// Options with the given priority and no hooks
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            hooks: TaskHooks::default(),
        }
    }
}

/// Immutable view of the merged (queue ∪ active) task map, keyed by topic
///
/// Subscribers receive this on every mutation and must not assume the
/// durable write has finished when it arrives.
pub type TaskSnapshot = HashMap<TopicId, DownloadTask>;

/// Terminal outcome of one transfer attempt
///
/// `Cancelled` is deliberately distinct from `Failed` so that an abort via
/// the task's own cancellation token is never misclassified as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes streamed to the destination
    Completed,
    /// Aborted via the task's cancellation token
    Cancelled,
    /// Transfer failed for any non-cancellation reason
    Failed(String),
}
