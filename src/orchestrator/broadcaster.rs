//! Per-session fan-out of accepted snapshots.
//!
//! Subscribers only see snapshots published after they subscribed. A
//! subscriber that needs the current state reads the snapshot store first
//! and then applies live updates with a higher `version`.

use std::collections::HashMap;

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::models::snapshot::Snapshot;

/// Shared broadcaster keyed by session id.
pub struct StateBroadcaster {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<Snapshot>>>,
}

impl StateBroadcaster {
    /// Create a broadcaster whose per-session buffers hold `capacity`
    /// snapshots; slower receivers observe `RecvError::Lagged`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to future snapshots of `session_id`.
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<Snapshot> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(session_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish `snapshot` to the current subscribers of `session_id`,
    /// returning how many received it.
    pub async fn publish(&self, session_id: &str, snapshot: &Snapshot) -> usize {
        let mut channels = self.channels.lock().await;
        let Some(sender) = channels.get(session_id) else {
            return 0;
        };

        if let Ok(receivers) = sender.send(snapshot.clone()) {
            debug!(session_id, version = snapshot.version, receivers, "snapshot published");
            receivers
        } else {
            // Every receiver is gone; forget the channel.
            channels.remove(session_id);
            0
        }
    }

    /// Number of live subscribers for `session_id`.
    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        let channels = self.channels.lock().await;
        channels
            .get(session_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Drop the channel for `session_id`; current subscribers observe
    /// `RecvError::Closed`.
    pub async fn close(&self, session_id: &str) {
        self.channels.lock().await.remove(session_id);
    }
}
