//! Core application logic for Topic Fetcher
//!
//! This module contains the download manager components: the HTTP client
//! and transfer executor, data models, the durable task store, network and
//! storage probes, and the scheduler that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use topic_fetcher::app::{
//!     DownloadOptions, DownloadScheduler, JsonTaskStore, NetworkMonitor, SchedulerConfig,
//!     TopicClient, DiskProbe,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SchedulerConfig::new();
//! let store = Arc::new(JsonTaskStore::new(&config.download_dir).await?);
//! let probe = Arc::new(DiskProbe::new(&config.download_dir));
//! let client = Arc::new(TopicClient::new()?);
//! let network = Arc::new(NetworkMonitor::default());
//!
//! let scheduler = DownloadScheduler::new(config, client, probe, store, network);
//! scheduler.restore().await?;
//!
//! let task_id = scheduler
//!     .enqueue("algebra-basics", DownloadOptions::with_priority(5))
//!     .await?;
//! println!("queued as {}", task_id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod models;
pub mod net;
pub mod scheduler;
pub mod storage;
pub mod store;

// Re-export main public API
pub use client::{destination_path, ChunkHook, ClientConfig, TopicClient, TopicFetcher};
pub use models::{
    DownloadOptions, DownloadStatus, DownloadTask, TaskHooks, TaskId, TaskSnapshot, TopicId,
    TransferOutcome,
};
pub use net::{NetworkKind, NetworkMonitor, NetworkState};
pub use scheduler::{
    spawn_network_listener, spawn_periodic_wake, DownloadScheduler, SchedulerConfig,
    SchedulerStats, SubscriberFn, SubscriptionId,
};
pub use storage::{check_admission, DiskProbe, StorageProbe};
pub use store::{JsonTaskStore, MemoryTaskStore, TaskStore};
