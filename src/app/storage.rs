//! Storage-capacity admission control
//!
//! Before a download is accepted the scheduler compares the remaining disk
//! space against the topic's probed size plus a safety margin. The probe is
//! a trait so tests can substitute a fixed-capacity fake for the real
//! filesystem query.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::constants::scheduler::STORAGE_SAFETY_MARGIN;
use crate::errors::{EnqueueError, EnqueueResult};

/// Source of the free-disk-space figure used for admission decisions
#[async_trait]
pub trait StorageProbe: Send + Sync {
    /// Remaining free space, in bytes, on the volume holding the download
    /// directory
    async fn free_disk_space(&self) -> std::io::Result<u64>;
}

/// Production probe backed by a filesystem statvfs-style query
#[derive(Debug, Clone)]
pub struct DiskProbe {
    path: PathBuf,
}

impl DiskProbe {
    /// Probe the volume containing `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StorageProbe for DiskProbe {
    async fn free_disk_space(&self) -> std::io::Result<u64> {
        let path = self.path.clone();
        // statvfs is a blocking syscall; keep it off the async runtime
        tokio::task::spawn_blocking(move || fs2::available_space(&path))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

/// Check whether `size_bytes` fits on disk with the safety margin applied
///
/// Rejects with `InsufficientStorage` when
/// `free < size_bytes * STORAGE_SAFETY_MARGIN`.
pub async fn check_admission(probe: &dyn StorageProbe, size_bytes: u64) -> EnqueueResult<()> {
    let available = probe
        .free_disk_space()
        .await
        .map_err(EnqueueError::StorageProbe)?;

    let required = (size_bytes as f64 * STORAGE_SAFETY_MARGIN).ceil() as u64;
    debug!(size_bytes, required, available, "Storage admission check");

    if available < required {
        return Err(EnqueueError::InsufficientStorage {
            required,
            available,
        });
    }
    Ok(())
}
