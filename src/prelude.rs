//! Prelude module for Topic Fetcher Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical
//! usage with a single `use topic_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use topic_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SchedulerConfig::new();
//!     let store = Arc::new(JsonTaskStore::new(&config.download_dir).await?);
//!     let probe = Arc::new(DiskProbe::new(&config.download_dir));
//!     let client = Arc::new(TopicClient::new()?);
//!     let network = Arc::new(NetworkMonitor::default());
//!
//!     let scheduler = DownloadScheduler::new(config, client, probe, store, network);
//!     scheduler.restore().await?;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, EnqueueError, FetchError, Result, StoreError};

// Essential app components that are used in most integrations
pub use crate::app::{
    DiskProbe,
    DownloadOptions,
    // Core orchestration
    DownloadScheduler,
    DownloadStatus,
    // Data types
    DownloadTask,
    JsonTaskStore,
    MemoryTaskStore,
    NetworkKind,
    NetworkMonitor,
    NetworkState,
    SchedulerConfig,
    SchedulerStats,
    SubscriptionId,
    TaskHooks,
    TaskId,
    TaskSnapshot,
    TopicClient,
    // Trait seams
    TopicFetcher,
    TopicId,
    StorageProbe,
    TaskStore,
    TransferOutcome,

    // Background drivers
    spawn_network_listener,
    spawn_periodic_wake,
};

// Commonly used constants
pub use crate::constants::scheduler::{
    BACKGROUND_WAKE_INTERVAL, MAX_CONCURRENT_DOWNLOADS, STORAGE_SAFETY_MARGIN,
};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        // Verify that essential types are available through prelude
        let config = SchedulerConfig::for_testing("/tmp/topics");
        assert_eq!(config.max_concurrent, MAX_CONCURRENT_DOWNLOADS);

        let state = NetworkState::offline();
        assert!(!state.connected);

        let options = DownloadOptions::with_priority(3);
        assert_eq!(options.priority, 3);
    }

    #[tokio::test]
    async fn test_prelude_integration_pattern() {
        // The common embedding pattern should type-check with prelude
        // imports alone
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
        assert!(store.restore().await.unwrap().is_none());
    }
}
