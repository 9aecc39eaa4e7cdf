//! Error types for Topic Fetcher
//!
//! This module defines error types for all components of the download
//! manager. Errors are designed to be actionable: enqueue-time failures are
//! surfaced synchronously to the caller, everything else is delivered
//! through task callbacks and subscriber notifications.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced synchronously from `enqueue`
#[derive(Error, Debug)]
pub enum EnqueueError {
    /// Not enough free disk space for the requested topic (including the
    /// safety margin). The caller must free space before retrying.
    #[error(
        "Insufficient storage for download: {required} bytes required (with margin), {available} bytes available"
    )]
    InsufficientStorage { required: u64, available: u64 },

    /// The remote size probe could not be completed. Transient; the caller
    /// may retry later.
    #[error("Could not determine size for topic {topic}: {reason}")]
    SizeUnavailable { topic: String, reason: String },

    /// Free disk space query failed
    #[error("Failed to query free disk space")]
    StorageProbe(#[source] std::io::Error),
}

/// HTTP client and transfer errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Size probe response carried no usable Content-Length
    #[error("Size probe returned no Content-Length header")]
    MissingContentLength,

    /// I/O error writing the destination file
    #[error("File I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid URL constructed for a topic endpoint
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },
}

/// Durable task store errors
///
/// Store failures never roll back in-memory state; they are logged and the
/// next mutation cycle rewrites the full snapshot.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error reading or writing the snapshot file
    #[error("Snapshot I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot (de)serialization error
    #[error("Snapshot serialization error")]
    Serde(#[from] serde_json::Error),

    /// Atomic rename of the temp snapshot failed
    #[error("Atomic snapshot write failed: could not rename {temp_path} to {final_path}")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Enqueue admission error
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    /// Transfer / HTTP error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Enqueue(EnqueueError::SizeUnavailable { .. })
            | AppError::Enqueue(EnqueueError::StorageProbe(_))
            | AppError::Fetch(FetchError::Http(_))
            | AppError::Fetch(FetchError::ServerError { .. })
            | AppError::Store(_) => true,

            AppError::Enqueue(EnqueueError::InsufficientStorage { .. })
            | AppError::Fetch(FetchError::InvalidUrl { .. })
            | AppError::Fetch(FetchError::MissingContentLength) => false,

            _ => false,
        }
    }

    /// Get error category for logging and telemetry
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Enqueue(_) => "enqueue",
            AppError::Fetch(_) => "fetch",
            AppError::Store(_) => "store",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Enqueue result type alias
pub type EnqueueResult<T> = std::result::Result<T, EnqueueError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_storage_not_recoverable() {
        let err = AppError::Enqueue(EnqueueError::InsufficientStorage {
            required: 1100,
            available: 500,
        });
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "enqueue");
    }

    #[test]
    fn test_size_unavailable_recoverable() {
        let err = AppError::Enqueue(EnqueueError::SizeUnavailable {
            topic: "T1".to_string(),
            reason: "timeout".to_string(),
        });
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_store_errors_recoverable() {
        let err = AppError::Store(StoreError::AtomicWriteFailed {
            temp_path: PathBuf::from("a.tmp"),
            final_path: PathBuf::from("a"),
        });
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "store");
    }
}
