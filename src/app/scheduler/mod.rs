//! Download scheduling core
//!
//! This module owns the task lifecycle: bounded-concurrency admission in
//! priority order, pause/resume/cancel semantics, connectivity-driven
//! suspension, storage admission control, fan-out notification, and
//! persistence after every mutation.

pub mod background;
pub mod config;
pub mod core;
pub mod hub;
pub mod state;

pub use background::{spawn_network_listener, spawn_periodic_wake};
pub use config::SchedulerConfig;
pub use core::DownloadScheduler;
pub use hub::{SubscriberFn, SubscriptionHub, SubscriptionId};
pub use state::SchedulerStats;
