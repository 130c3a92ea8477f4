use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use croft_types::events::FeedEvent;

/// Fans feed events out to every connected client and tracks which
/// connection currently speaks for each profile.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for feed events; every connection receives every
    /// event and filters by its own subscriptions.
    broadcast_tx: broadcast::Sender<FeedEvent>,

    /// profile_id -> conn_id of the connection that owns it. A reconnect
    /// replaces the entry; the old connection's cleanup then no-ops.
    connections: RwLock<HashMap<Uuid, Uuid>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to feed events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: FeedEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a connection as the current one for a profile.
    /// Returns the new conn_id; any previous connection is superseded.
    pub async fn register_connection(&self, profile_id: Uuid) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.connections.write().await.insert(profile_id, conn_id);
        conn_id
    }

    /// End a connection. Returns true only if this conn_id still owned the
    /// profile; a newer connection may have taken over, in which case the
    /// caller must not touch presence.
    pub async fn end_connection(&self, profile_id: Uuid, conn_id: Uuid) -> bool {
        let mut connections = self.inner.connections.write().await;
        match connections.get(&profile_id) {
            Some(current) if *current == conn_id => {
                connections.remove(&profile_id);
                true
            }
            _ => false,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newer_connection_supersedes_older() {
        let dispatcher = Dispatcher::new();
        let profile = Uuid::new_v4();

        let first = dispatcher.register_connection(profile).await;
        let second = dispatcher.register_connection(profile).await;

        // The superseded connection's cleanup is a no-op
        assert!(!dispatcher.end_connection(profile, first).await);
        // The current one still owns the profile
        assert!(dispatcher.end_connection(profile, second).await);
        // And ending twice is also a no-op
        assert!(!dispatcher.end_connection(profile, second).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.broadcast(FeedEvent::MessageDelete {
            message_id: Uuid::new_v4(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, FeedEvent::MessageDelete { .. }));
    }
}
