//! Scheduler configuration

use std::path::PathBuf;

use crate::constants::{files, scheduler};

/// Configuration for the download scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of transfers running at once
    pub max_concurrent: usize,
    /// Directory downloaded topic bundles are written to
    pub download_dir: PathBuf,
}

impl SchedulerConfig {
    /// Production defaults: concurrency bound from constants, downloads
    /// under the platform data directory
    pub fn new() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(files::APP_DIR_NAME);
        Self {
            max_concurrent: scheduler::MAX_CONCURRENT_DOWNLOADS,
            download_dir: base.join(files::TOPICS_DIR_NAME),
        }
    }

    /// Configuration for tests: custom download dir, same bound
    pub fn for_testing(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_concurrent: scheduler::MAX_CONCURRENT_DOWNLOADS,
            download_dir: download_dir.into(),
        }
    }

    /// Override the concurrency bound
    pub fn with_max_concurrent(mut self, bound: usize) -> Self {
        self.max_concurrent = bound.max(1);
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
