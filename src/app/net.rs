//! Connectivity monitoring
//!
//! The scheduler reacts to connectivity transitions: on disconnect every
//! in-flight transfer is bulk-paused, on reconnect paused work is re-queued.
//! This module provides the state type and a watch-channel based monitor
//! that the platform layer (or tests) feed with transitions.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Kind of network link currently in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Wifi,
    Cellular,
    /// No link at all
    None,
}

/// Observed connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    /// Whether the device currently has a usable connection
    pub connected: bool,
    /// The link kind behind the connection
    pub kind: NetworkKind,
}

impl NetworkState {
    /// A connected WiFi state
    pub fn wifi() -> Self {
        Self {
            connected: true,
            kind: NetworkKind::Wifi,
        }
    }

    /// A connected cellular state
    pub fn cellular() -> Self {
        Self {
            connected: true,
            kind: NetworkKind::Cellular,
        }
    }

    /// A fully disconnected state
    pub fn offline() -> Self {
        Self {
            connected: false,
            kind: NetworkKind::None,
        }
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::wifi()
    }
}

/// Connectivity monitor backed by a watch channel
///
/// The producing side (`set_state`) is driven by whatever platform facility
/// reports link transitions; consumers subscribe and observe the latest
/// state plus change notifications. Setting an identical state is a no-op
/// at the channel level only in the sense that observers can cheaply
/// deduplicate; the monitor itself does not filter.
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkState>,
}

impl NetworkMonitor {
    /// Create a monitor with an initial state
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current connectivity state
    pub fn state(&self) -> NetworkState {
        *self.tx.borrow()
    }

    /// Report a connectivity transition
    pub fn set_state(&self, state: NetworkState) {
        debug!(
            connected = state.connected,
            kind = ?state.kind,
            "Network state transition"
        );
        // send only fails when every receiver is gone, which is fine: the
        // latest value is still observable through `state()`
        let _ = self.tx.send(state);
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_monitor_reports_latest_state() {
        let monitor = NetworkMonitor::new(NetworkState::wifi());
        assert!(monitor.state().connected);

        monitor.set_state(NetworkState::offline());
        assert!(!monitor.state().connected);
        assert_eq!(monitor.state().kind, NetworkKind::None);
    }

    #[tokio::test]
    async fn test_subscriber_sees_transitions() {
        let monitor = NetworkMonitor::new(NetworkState::wifi());
        let mut rx = monitor.subscribe();

        monitor.set_state(NetworkState::cellular());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().kind, NetworkKind::Cellular);

        monitor.set_state(NetworkState::offline());
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().connected);
    }

    #[tokio::test]
    async fn test_set_state_without_subscribers_is_harmless() {
        let monitor = NetworkMonitor::default();
        monitor.set_state(NetworkState::offline());
        monitor.set_state(NetworkState::wifi());
        assert!(monitor.state().connected);
    }
}
