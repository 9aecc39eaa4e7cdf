//! Download scheduler
//!
//! The scheduler owns the task lifecycle: it admits queued work up to the
//! concurrency bound in priority order (enqueue age breaking ties), reacts
//! to connectivity transitions, applies storage admission control, and
//! publishes every mutation to subscribers followed by a durable snapshot
//! write.
//!
//! Concurrency discipline: a single async mutex guards the task maps.
//! Every operation follows lock → mutate → unlock → notify → persist, so
//! callbacks fired during notification can re-enter the scheduler without
//! corrupting in-flight iteration, and no subscriber ever observes a
//! half-applied mutation. Transfers themselves run as spawned tasks and
//! re-enter through `update_progress` / `finish_transfer`.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::hub::{SubscriberFn, SubscriptionHub, SubscriptionId};
use super::state::{SchedulerState, SchedulerStats};
use crate::app::client::{destination_path, TopicFetcher};
use crate::app::models::{
    DownloadOptions, DownloadStatus, DownloadTask, TaskId, TopicId, TransferOutcome,
};
use crate::app::net::{NetworkMonitor, NetworkState};
use crate::app::storage::{self, StorageProbe};
use crate::app::store::{self, TaskStore};
use crate::errors::{EnqueueError, EnqueueResult, StoreResult};

/// Process-wide download manager
///
/// Constructed once at startup and shared via `Arc`; all collaborators are
/// injected so tests can substitute fakes for the network, disk, and
/// persistence layers.
pub struct DownloadScheduler {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    hub: SubscriptionHub,
    fetcher: Arc<dyn TopicFetcher>,
    storage: Arc<dyn StorageProbe>,
    store: Arc<dyn TaskStore>,
    network: Arc<NetworkMonitor>,
}

impl DownloadScheduler {
    /// Create a scheduler with injected collaborators
    pub fn new(
        config: SchedulerConfig,
        fetcher: Arc<dyn TopicFetcher>,
        storage: Arc<dyn StorageProbe>,
        store: Arc<dyn TaskStore>,
        network: Arc<NetworkMonitor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(SchedulerState::new()),
            hub: SubscriptionHub::new(),
            fetcher,
            storage,
            store,
            network,
        })
    }

    /// The connectivity monitor this scheduler reacts to
    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    /// Queue a topic for download
    ///
    /// Probes the remote size, applies storage admission control, creates
    /// the task in `Queued` state, and attempts to admit it immediately.
    /// While a live (queued/downloading/paused) task for the topic exists
    /// its id is returned unchanged; a terminal or errored record for the
    /// topic is superseded by the fresh task.
    ///
    /// # Errors
    ///
    /// `SizeUnavailable` when the size probe fails (retryable later);
    /// `InsufficientStorage` when free space is below the probed size plus
    /// safety margin (caller must free space first). No task is created in
    /// either case.
    pub async fn enqueue(
        self: &Arc<Self>,
        topic_id: impl Into<TopicId>,
        options: DownloadOptions,
    ) -> EnqueueResult<TaskId> {
        let topic_id = topic_id.into();

        // Idempotent fast path, before spending a network round trip
        {
            let state = self.state.lock().await;
            if let Some(existing) = state.live_task_for_topic(&topic_id) {
                debug!(topic = %topic_id, task = %existing.id, "Enqueue joined existing live task");
                return Ok(existing.id);
            }
        }

        let size_bytes = self.fetcher.probe_size(&topic_id).await.map_err(|e| {
            EnqueueError::SizeUnavailable {
                topic: topic_id.to_string(),
                reason: e.to_string(),
            }
        })?;

        storage::check_admission(self.storage.as_ref(), size_bytes).await?;

        let (task_id, snapshot) = {
            let mut state = self.state.lock().await;
            // Re-check: another enqueue may have won while we probed
            if let Some(existing) = state.live_task_for_topic(&topic_id) {
                return Ok(existing.id);
            }
            state.supersede_topic(&topic_id);

            let task_id = state.allocate_task_id();
            let source_url = self.fetcher.content_url(&topic_id);
            let task = DownloadTask::new(
                task_id,
                topic_id.clone(),
                source_url,
                size_bytes,
                options.priority,
            );
            info!(
                task = %task_id,
                topic = %topic_id,
                size_bytes,
                priority = options.priority,
                "Enqueued download"
            );
            state.insert_new(task, options.hooks);
            (task_id, state.snapshot())
        };

        self.publish(snapshot).await;
        self.process_queue().await;
        Ok(task_id)
    }

    /// Suspend an in-flight transfer, keeping its byte counters
    ///
    /// Only effective while the task is `Downloading`; any other state is
    /// a silent no-op (no duplicate notification, no error).
    pub async fn pause(self: &Arc<Self>, task_id: TaskId) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let downloading = state
                .task_status(&task_id)
                .map(|s| s == DownloadStatus::Downloading)
                .unwrap_or(false);
            if !downloading {
                debug!(task = %task_id, "Pause ignored: task not downloading");
                return;
            }
            state.cancel_token(&task_id);
            let Some(mut task) = state.take_active(&task_id) else {
                return;
            };
            task.status = DownloadStatus::Paused;
            info!(task = %task_id, topic = %task.topic_id, "Paused download");
            state.file_in_queue(task);
            state.snapshot()
        };
        self.publish(snapshot).await;
        // Pausing frees a slot for other queued work
        self.process_queue().await;
    }

    /// Resume a paused task
    ///
    /// Only effective while the task is `Paused`: it returns to `Queued`
    /// and admission is re-attempted.
    pub async fn resume(self: &Arc<Self>, task_id: TaskId) {
        let snapshot = {
            let mut state = self.state.lock().await;
            match state.queued_task_mut(&task_id) {
                Some(task) if task.status == DownloadStatus::Paused => {
                    task.status = DownloadStatus::Queued;
                    info!(task = %task_id, topic = %task.topic_id, "Resumed download");
                }
                _ => {
                    debug!(task = %task_id, "Resume ignored: task not paused");
                    return;
                }
            }
            state.snapshot()
        };
        self.publish(snapshot).await;
        self.process_queue().await;
    }

    /// Abort a task from any non-terminal state
    ///
    /// An in-flight transfer is cancelled through its token; the task is
    /// removed from both the queue and active sets. The task's `on_error`
    /// hook is never invoked for a cancellation.
    pub async fn cancel(self: &Arc<Self>, task_id: TaskId) {
        let snapshot = {
            let mut state = self.state.lock().await;
            match state.task_status(&task_id) {
                Some(status) if !status.is_terminal() => {}
                _ => {
                    debug!(task = %task_id, "Cancel ignored: task terminal or unknown");
                    return;
                }
            }
            let Some(mut task) = state.remove_task(&task_id) else {
                return;
            };
            task.status = DownloadStatus::Cancelled;
            info!(task = %task_id, topic = %task.topic_id, "Cancelled download");
            state.snapshot()
        };
        self.publish(snapshot).await;
        self.process_queue().await;
    }

    /// Point lookup of the task tracking a topic, if any
    pub async fn get_task(&self, topic_id: &TopicId) -> Option<DownloadTask> {
        let state = self.state.lock().await;
        state.task_for_topic(topic_id).cloned()
    }

    /// Aggregate task counts by status
    pub async fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().await;
        state.stats()
    }

    /// Register an observer for task-map changes
    pub fn subscribe(&self, callback: SubscriberFn) -> SubscriptionId {
        self.hub.subscribe(callback)
    }

    /// Remove an observer; safe to call repeatedly
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.hub.unsubscribe(id)
    }

    /// Load the persisted snapshot from the store
    ///
    /// In-flight records from the previous run read back as `Paused` (the
    /// store reclassifies them); the id counter resumes past the highest
    /// restored id. Returns the number of restored tasks.
    pub async fn restore(self: &Arc<Self>) -> StoreResult<usize> {
        let Some(restored) = self.store.restore().await? else {
            debug!("No persisted download state to restore");
            return Ok(0);
        };
        let count = restored.len();
        let snapshot = {
            let mut state = self.state.lock().await;
            state.load_snapshot(restored);
            state.snapshot()
        };
        info!(count, "Restored persisted download tasks");
        self.publish(snapshot).await;
        self.process_queue().await;
        Ok(count)
    }

    /// React to a connectivity transition
    ///
    /// Disconnect bulk-pauses every in-flight transfer in a single
    /// mutation; reconnect re-queues all paused work and re-runs
    /// admission. The pause reason is not remembered beyond the log line.
    pub async fn handle_network_change(self: &Arc<Self>, network: NetworkState) {
        if network.connected {
            info!(kind = ?network.kind, "Network restored; resuming paused downloads");
            self.resume_all_paused().await;
        } else {
            let snapshot = {
                let mut state = self.state.lock().await;
                let paused = state.bulk_pause_active();
                if paused == 0 {
                    debug!("Network lost with no transfers in flight");
                    return;
                }
                warn!(paused, "Network lost; bulk-paused in-flight downloads");
                state.snapshot()
            };
            self.publish(snapshot).await;
        }
    }

    /// Background wake-up handler: resume eligible work if the network is
    /// available, then return so the process may be suspended again
    pub async fn process_background_downloads(self: &Arc<Self>) {
        if !self.network.state().connected {
            debug!("Background wake skipped: network unavailable");
            return;
        }
        debug!("Background wake: resuming eligible downloads");
        self.resume_all_paused().await;
    }

    /// Promote all paused tasks to queued and re-run admission
    async fn resume_all_paused(self: &Arc<Self>) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.requeue_paused() == 0 {
                None
            } else {
                Some(state.snapshot())
            }
        };
        if let Some(snapshot) = snapshot {
            self.publish(snapshot).await;
        }
        self.process_queue().await;
    }

    /// Admission pass: start queued work while slots remain
    ///
    /// Runs after every state change that could free a slot and after
    /// every enqueue/resume. Admission is deferred entirely while the
    /// network is down; the reconnect handler re-runs it.
    pub(crate) async fn process_queue(self: &Arc<Self>) {
        if !self.network.state().connected {
            debug!("Admission deferred: network disconnected");
            return;
        }
        let (admitted, snapshot) = {
            let mut state = self.state.lock().await;
            let admitted = state.admit(self.config.max_concurrent);
            if admitted.is_empty() {
                return;
            }
            (admitted, state.snapshot())
        };
        for (task, token) in admitted {
            self.spawn_transfer(task, token);
        }
        self.publish(snapshot).await;
    }

    /// Drive one transfer to its terminal outcome on a spawned task
    fn spawn_transfer(self: &Arc<Self>, task: DownloadTask, token: CancellationToken) {
        let scheduler = Arc::clone(self);
        let dest = destination_path(&self.config.download_dir, &task.topic_id);
        tokio::spawn(async move {
            let task_id = task.id;

            // Chunk callbacks are synchronous; forward byte counts through
            // a channel into the async scheduler entry point
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u64>();
            let forwarder = {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    while let Some(bytes) = progress_rx.recv().await {
                        scheduler.update_progress(task_id, bytes).await;
                    }
                })
            };

            let outcome = scheduler
                .fetcher
                .fetch(
                    &task.source_url,
                    &dest,
                    Box::new(move |bytes| {
                        let _ = progress_tx.send(bytes);
                    }),
                    token,
                )
                .await;

            // The sender was dropped with the chunk callback; drain the
            // remaining ticks so progress happens-before the terminal
            // transition
            let _ = forwarder.await;
            scheduler.finish_transfer(task_id, outcome).await;
        });
    }

    /// Record a progress tick for an in-flight transfer
    async fn update_progress(self: &Arc<Self>, task_id: TaskId, downloaded_bytes: u64) {
        let (snapshot, hook, progress) = {
            let mut state = self.state.lock().await;
            let Some(task) = state.active_task_mut(&task_id) else {
                // Stale tick from a transfer that was paused or cancelled
                return;
            };
            task.record_progress(downloaded_bytes);
            let progress = task.progress;
            let hook = state
                .hooks_for(&task_id)
                .and_then(|h| h.on_progress.clone());
            (state.snapshot(), hook, progress)
        };
        if let Some(hook) = hook {
            hook(progress);
        }
        self.publish(snapshot).await;
    }

    /// Apply a transfer's terminal outcome
    async fn finish_transfer(self: &Arc<Self>, task_id: TaskId, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Completed => {
                let Some((snapshot, topic_id, hook)) = ({
                    let mut state = self.state.lock().await;
                    match state.take_active(&task_id) {
                        Some(mut task) => {
                            task.mark_completed();
                            let topic_id = task.topic_id.clone();
                            let hook = state
                                .hooks_for(&task_id)
                                .and_then(|h| h.on_complete.clone());
                            info!(task = %task_id, topic = %topic_id, "Download completed");
                            state.file_in_queue(task);
                            Some((state.snapshot(), topic_id, hook))
                        }
                        // The scheduler re-filed the task (pause/cancel)
                        // before the transfer observed its token; the
                        // scheduler's decision stands
                        None => None,
                    }
                }) else {
                    return;
                };
                if let Err(e) = self.store.record_downloaded(&topic_id).await {
                    store::log_persist_failure(&e);
                }
                if let Some(hook) = hook {
                    hook();
                }
                self.publish(snapshot).await;
                self.process_queue().await;
            }
            TransferOutcome::Failed(reason) => {
                let Some((snapshot, hook)) = ({
                    let mut state = self.state.lock().await;
                    match state.take_active(&task_id) {
                        Some(mut task) => {
                            task.mark_failed(reason.clone());
                            warn!(task = %task_id, topic = %task.topic_id, %reason, "Download failed");
                            let hook = state
                                .hooks_for(&task_id)
                                .and_then(|h| h.on_error.clone());
                            state.file_in_queue(task);
                            Some((state.snapshot(), hook))
                        }
                        None => None,
                    }
                }) else {
                    return;
                };
                if let Some(hook) = hook {
                    hook(&reason);
                }
                self.publish(snapshot).await;
                self.process_queue().await;
            }
            TransferOutcome::Cancelled => {
                // Pause, cancel, or bulk pause already decided the final
                // state and re-filed or removed the task
                debug!(task = %task_id, "Transfer aborted via cancellation token");
            }
        }
    }

    /// Deliver a snapshot to subscribers, then persist it
    ///
    /// Notification happens-after the in-memory mutation and before the
    /// durable write returns; observers must not assume persistence has
    /// finished. A persistence failure is logged and never rolls back the
    /// mutation.
    async fn publish(&self, snapshot: crate::app::models::TaskSnapshot) {
        self.hub.notify(&snapshot);
        if let Err(e) = self.store.persist(&snapshot).await {
            store::log_persist_failure(&e);
        }
    }
}

impl std::fmt::Debug for DownloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadScheduler")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .finish()
    }
}
