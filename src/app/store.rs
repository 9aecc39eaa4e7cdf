//! Durable task store
//!
//! The scheduler persists the full (queue ∪ active) task map after every
//! mutation and restores it on startup. The store is the sole source of
//! truth across restarts: a record found in `Downloading` state is
//! reclassified to `Paused` before it is handed back, because no transfer
//! can survive a process restart.
//!
//! Snapshots are written whole-map and atomically (temp file + rename in
//! the same directory), so a crash mid-write never leaves a corrupt
//! partial snapshot behind. Cancellation tokens and hooks are runtime-only
//! and never reach the store.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::models::{DownloadStatus, TaskSnapshot, TopicId};
use crate::constants::files;
use crate::errors::{StoreError, StoreResult};

/// Durable key-value persistence for the task map and the downloaded set
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Write the whole task snapshot durably
    async fn persist(&self, snapshot: &TaskSnapshot) -> StoreResult<()>;

    /// Read the last persisted snapshot, if any
    ///
    /// Implementations must reclassify `Downloading` records to `Paused`
    /// before returning.
    async fn restore(&self) -> StoreResult<Option<TaskSnapshot>>;

    /// Record a topic as fully downloaded
    async fn record_downloaded(&self, topic_id: &TopicId) -> StoreResult<()>;

    /// The set of fully downloaded topics
    async fn downloaded_topics(&self) -> StoreResult<HashSet<TopicId>>;
}

/// JSON-file backed store
///
/// Keeps two sibling files under the state directory: the task snapshot
/// and the downloaded-topics set.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    tasks_path: PathBuf,
    downloaded_path: PathBuf,
    /// Serializes the downloaded-set read-modify-write; shared by clones
    downloaded_lock: Arc<Mutex<()>>,
}

impl JsonTaskStore {
    /// Create a store rooted at `state_dir`, creating the directory if
    /// needed
    pub async fn new(state_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let state_dir = state_dir.as_ref();
        tokio::fs::create_dir_all(state_dir)
            .await
            .map_err(|source| StoreError::Io {
                path: state_dir.to_path_buf(),
                source,
            })?;

        Ok(Self {
            tasks_path: state_dir.join(files::TASKS_FILE_NAME),
            downloaded_path: state_dir.join(files::DOWNLOADED_FILE_NAME),
            downloaded_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Path of the snapshot file (for diagnostics)
    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    /// Serialize `value` and write it atomically to `path`
    ///
    /// Every call writes through its own uniquely named temp file in the
    /// destination directory (same volume, so the rename is atomic), so
    /// concurrent writers never share an inode and the final rename is
    /// whole-file last-writer-wins.
    async fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        let final_path = path.to_path_buf();
        let dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // Blocking file I/O stays off the async runtime
        tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .suffix(files::TMP_SUFFIX)
                .tempfile_in(&dir)
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?;
            let temp_path = file.path().to_path_buf();

            file.write_all(&json).map_err(|source| StoreError::Io {
                path: temp_path.clone(),
                source,
            })?;
            file.as_file().sync_all().map_err(|source| StoreError::Io {
                path: temp_path.clone(),
                source,
            })?;
            file.persist(&final_path)
                .map_err(|_| StoreError::AtomicWriteFailed {
                    temp_path,
                    final_path: final_path.clone(),
                })?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?
    }

    /// Read and deserialize `path`, returning `None` when the file does
    /// not exist yet
    async fn read_optional<T: serde::de::DeserializeOwned>(
        path: &Path,
    ) -> StoreResult<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn persist(&self, snapshot: &TaskSnapshot) -> StoreResult<()> {
        Self::write_atomic(&self.tasks_path, snapshot).await?;
        debug!(tasks = snapshot.len(), "Persisted task snapshot");
        Ok(())
    }

    async fn restore(&self) -> StoreResult<Option<TaskSnapshot>> {
        let Some(mut snapshot) = Self::read_optional::<TaskSnapshot>(&self.tasks_path).await?
        else {
            debug!("No persisted task snapshot found");
            return Ok(None);
        };

        let mut reclassified = 0usize;
        for task in snapshot.values_mut() {
            if task.status == DownloadStatus::Downloading {
                task.status = DownloadStatus::Paused;
                reclassified += 1;
            }
        }
        if reclassified > 0 {
            info!(
                reclassified,
                "Reclassified in-flight tasks from previous run to paused"
            );
        }

        Ok(Some(snapshot))
    }

    async fn record_downloaded(&self, topic_id: &TopicId) -> StoreResult<()> {
        // Concurrent completions run read-modify-write on the same file;
        // the lock keeps one writer's update from erasing the other's
        let _guard = self.downloaded_lock.lock().await;
        let mut topics: HashSet<TopicId> = Self::read_optional(&self.downloaded_path)
            .await?
            .unwrap_or_default();
        if topics.insert(topic_id.clone()) {
            Self::write_atomic(&self.downloaded_path, &topics).await?;
            info!(topic = %topic_id, "Recorded topic as downloaded");
        }
        Ok(())
    }

    async fn downloaded_topics(&self) -> StoreResult<HashSet<TopicId>> {
        Ok(Self::read_optional(&self.downloaded_path)
            .await?
            .unwrap_or_default())
    }
}

/// In-memory store for tests and embedders that do not need durability
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    state: std::sync::Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: Option<TaskSnapshot>,
    downloaded: HashSet<TopicId>,
    persist_count: u64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `persist` has been called
    pub fn persist_count(&self) -> u64 {
        self.state.lock().expect("store lock poisoned").persist_count
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn persist(&self, snapshot: &TaskSnapshot) -> StoreResult<()> {
        let mut state = self.state.lock().expect("store lock poisoned");
        state.snapshot = Some(snapshot.clone());
        state.persist_count += 1;
        Ok(())
    }

    async fn restore(&self) -> StoreResult<Option<TaskSnapshot>> {
        let state = self.state.lock().expect("store lock poisoned");
        let mut snapshot = state.snapshot.clone();
        if let Some(map) = snapshot.as_mut() {
            for task in map.values_mut() {
                if task.status == DownloadStatus::Downloading {
                    task.status = DownloadStatus::Paused;
                }
            }
        }
        Ok(snapshot)
    }

    async fn record_downloaded(&self, topic_id: &TopicId) -> StoreResult<()> {
        let mut state = self.state.lock().expect("store lock poisoned");
        state.downloaded.insert(topic_id.clone());
        Ok(())
    }

    async fn downloaded_topics(&self) -> StoreResult<HashSet<TopicId>> {
        let state = self.state.lock().expect("store lock poisoned");
        Ok(state.downloaded.clone())
    }
}

/// Log a persistence failure without propagating it
///
/// Availability is favored over strict durability: the in-memory mutation
/// stands and the next mutation cycle rewrites the full snapshot.
pub fn log_persist_failure(err: &StoreError) {
    warn!(error = %err, "Task snapshot persistence failed; state will be rewritten on next mutation");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{DownloadTask, TaskId};
    use tempfile::TempDir;

    fn sample_task(id: u64, topic: &str, status: DownloadStatus) -> DownloadTask {
        let mut task = DownloadTask::new(
            TaskId::new(id),
            TopicId::from(topic),
            format!("https://example.com/api/v1/topics/{}/content", topic),
            1000,
            1,
        );
        task.status = status;
        task
    }

    #[tokio::test]
    async fn test_restore_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path()).await.unwrap();
        assert!(store.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path()).await.unwrap();

        let mut snapshot = TaskSnapshot::new();
        snapshot.insert(
            TopicId::from("T1"),
            sample_task(1, "T1", DownloadStatus::Queued),
        );
        snapshot.insert(
            TopicId::from("T2"),
            sample_task(2, "T2", DownloadStatus::Paused),
        );

        store.persist(&snapshot).await.unwrap();
        let restored = store.restore().await.unwrap().unwrap();

        assert_eq!(restored.len(), 2);
        let t1 = &restored[&TopicId::from("T1")];
        assert_eq!(t1.status, DownloadStatus::Queued);
        assert_eq!(t1.size_bytes, 1000);
    }

    #[tokio::test]
    async fn test_restore_reclassifies_downloading_to_paused() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path()).await.unwrap();

        let mut snapshot = TaskSnapshot::new();
        let mut in_flight = sample_task(1, "T1", DownloadStatus::Downloading);
        in_flight.record_progress(400);
        snapshot.insert(TopicId::from("T1"), in_flight);
        snapshot.insert(
            TopicId::from("T2"),
            sample_task(2, "T2", DownloadStatus::Completed),
        );

        store.persist(&snapshot).await.unwrap();
        let restored = store.restore().await.unwrap().unwrap();

        // Simulated crash: the in-flight task reads back paused, with its
        // byte counters intact; all other fields are unchanged
        let t1 = &restored[&TopicId::from("T1")];
        assert_eq!(t1.status, DownloadStatus::Paused);
        assert_eq!(t1.downloaded_bytes, 400);

        let t2 = &restored[&TopicId::from("T2")];
        assert_eq!(t2.status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_persist_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path()).await.unwrap();

        let mut first = TaskSnapshot::new();
        first.insert(
            TopicId::from("T1"),
            sample_task(1, "T1", DownloadStatus::Queued),
        );
        store.persist(&first).await.unwrap();

        let second = TaskSnapshot::new();
        store.persist(&second).await.unwrap();

        let restored = store.restore().await.unwrap().unwrap();
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_downloaded_set_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path()).await.unwrap();

        assert!(store.downloaded_topics().await.unwrap().is_empty());

        store.record_downloaded(&TopicId::from("T1")).await.unwrap();
        store.record_downloaded(&TopicId::from("T2")).await.unwrap();
        // Re-recording is idempotent
        store.record_downloaded(&TopicId::from("T1")).await.unwrap();

        let topics = store.downloaded_topics().await.unwrap();
        assert_eq!(topics.len(), 2);
        assert!(topics.contains(&TopicId::from("T1")));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path()).await.unwrap();
        store.persist(&TaskSnapshot::new()).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(files::TMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_downloaded_records_are_all_kept() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonTaskStore::new(dir.path()).await.unwrap());

        // Every concurrent read-modify-write must land; none may be lost
        // or fail on a colliding temp file
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .record_downloaded(&TopicId::from(format!("T{}", i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let topics = store.downloaded_topics().await.unwrap();
        assert_eq!(topics.len(), 16);
        for i in 0..16 {
            assert!(topics.contains(&TopicId::from(format!("T{}", i))));
        }
    }

    #[tokio::test]
    async fn test_concurrent_persists_leave_one_whole_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonTaskStore::new(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let mut snapshot = TaskSnapshot::new();
                    let topic = format!("T{}", i);
                    snapshot.insert(
                        TopicId::from(topic.clone()),
                        sample_task(i + 1, &topic, DownloadStatus::Queued),
                    );
                    store.persist(&snapshot).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Whole-file last-writer-wins: the surviving snapshot is exactly
        // one of the written maps, never a truncated or merged mixture
        let restored = store.restore().await.unwrap().unwrap();
        assert_eq!(restored.len(), 1);
        let task = restored.values().next().unwrap();
        assert_eq!(task.topic_id, TopicId::from(format!("T{}", task.id.raw() - 1)));
    }

    #[tokio::test]
    async fn test_memory_store_reclassifies_and_counts() {
        let store = MemoryTaskStore::new();
        let mut snapshot = TaskSnapshot::new();
        snapshot.insert(
            TopicId::from("T1"),
            sample_task(1, "T1", DownloadStatus::Downloading),
        );
        store.persist(&snapshot).await.unwrap();
        store.persist(&snapshot).await.unwrap();

        assert_eq!(store.persist_count(), 2);
        let restored = store.restore().await.unwrap().unwrap();
        assert_eq!(
            restored[&TopicId::from("T1")].status,
            DownloadStatus::Paused
        );
    }
}
