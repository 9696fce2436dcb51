//! tailnet update conduit for long-polling map sessions.
//!
//! the [`StateNotifier`] lets store-mutating handlers wake every streaming
//! map session. signals carry no payload and coalesce on the receiving
//! side: many notifications within one sync window cause at most one
//! rebuild.

use tokio::sync::broadcast;

/// event sent when tailnet state changes and sessions should resync.
#[derive(Debug, Clone)]
pub struct StateChanged;

/// notifier broadcasting state changes to streaming map sessions.
///
/// uses `tokio::sync::broadcast` for one-to-many delivery. clones share the
/// same channel. a subscriber that falls behind sees `RecvError::Lagged`,
/// which sessions treat like any other update signal.
#[derive(Clone)]
pub struct StateNotifier {
    sender: broadcast::Sender<StateChanged>,
}

impl StateNotifier {
    /// create a new notifier.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(20);
        Self { sender }
    }

    /// subscribe to state change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.sender.subscribe()
    }

    /// wake all subscribed sessions.
    pub fn notify_state_changed(&self) {
        // no receivers is fine; streaming sessions may not exist yet
        let _ = self.sender.send(StateChanged);
    }

    /// number of live subscriptions (one per streaming session).
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}
