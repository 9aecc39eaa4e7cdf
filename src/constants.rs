//! Application constants for Topic Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Topic-Fetcher/0.1.0 (Offline Content Tool)";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Timeout for the lightweight size probe request
    pub const SIZE_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Backend API endpoints for topic content
pub mod api {
    /// Default backend base URL
    pub const BASE_URL: &str = "https://api.brightmind.example.com";

    /// Path template for the topic size probe (HEAD)
    pub const TOPIC_SIZE_PATH: &str = "/api/v1/topics/{topic_id}/size";

    /// Path template for the topic content download (GET)
    pub const TOPIC_CONTENT_PATH: &str = "/api/v1/topics/{topic_id}/content";
}

/// Scheduler behavior constants
pub mod scheduler {
    use super::Duration;

    /// Maximum number of transfers running at once
    pub const MAX_CONCURRENT_DOWNLOADS: usize = 2;

    /// Free-space multiplier applied to a topic's size before admission.
    /// A download is rejected unless `free >= size * STORAGE_SAFETY_MARGIN`.
    pub const STORAGE_SAFETY_MARGIN: f64 = 1.1;

    /// Interval between background wake-ups that resume eligible work
    pub const BACKGROUND_WAKE_INTERVAL: Duration = Duration::from_secs(15 * 60);
}

/// File system layout constants
pub mod files {
    /// Application directory name under the platform data dir
    pub const APP_DIR_NAME: &str = "topic_fetcher";

    /// Subdirectory holding downloaded topic content
    pub const TOPICS_DIR_NAME: &str = "topics";

    /// File name for the persisted task snapshot
    pub const TASKS_FILE_NAME: &str = "download_tasks.json";

    /// File name for the durable set of fully downloaded topics
    pub const DOWNLOADED_FILE_NAME: &str = "downloaded_topics.json";

    /// Suffix appended to snapshot files during atomic writes
    pub const TMP_SUFFIX: &str = ".tmp";
}
