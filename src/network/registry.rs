//! Connection registry
//!
//! Shared by every per-connection task. Readers take a snapshot under a
//! short read lock and release it before sending anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::connection::{ConnectionHandle, ConnectionId, Outbound};
use super::NetworkConfig;

#[derive(Debug, Default)]
struct Inner {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
}

/// All connected clients
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            queue_capacity: config.send_queue_capacity,
        }
    }

    /// Register a new client and return its handle and outbound queue
    pub fn connect(&self, player_id: u32) -> (ConnectionHandle, Outbound) {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (handle, outbound) = ConnectionHandle::new(id, player_id, self.queue_capacity);

        self.inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle.clone());

        tracing::info!("Connection {} registered for player {}", id, player_id);
        (handle, outbound)
    }

    /// Remove a client; its handle stops accepting packets
    pub fn disconnect(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let removed = self
            .inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if let Some(handle) = &removed {
            handle.mark_disconnected();
            tracing::info!("Connection {} removed", id);
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of every connection, ordered by id
    pub fn all_connections(&self) -> Vec<ConnectionHandle> {
        let mut snapshot: Vec<ConnectionHandle> = self
            .inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        snapshot.sort_by_key(|handle| handle.id());
        snapshot
    }

    pub fn len(&self) -> usize {
        self.inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(&NetworkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_disconnect() {
        let registry = ConnectionRegistry::new(&NetworkConfig::default());
        let (a, _rx_a) = registry.connect(100);
        let (b, _rx_b) = registry.connect(200);

        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(b.id()).map(|h| h.player_id()), Some(200));

        let removed = registry.disconnect(a.id()).unwrap();
        assert!(!removed.is_connected());
        assert!(!a.is_connected());
        assert!(registry.disconnect(a.id()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = ConnectionRegistry::new(&NetworkConfig::default());
        let (a, _rx_a) = registry.connect(1);
        let (_b, _rx_b) = registry.connect(2);

        let snapshot = registry.all_connections();
        registry.disconnect(a.id());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id(), a.id());
        assert_eq!(registry.all_connections().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_churn() {
        let registry = ConnectionRegistry::new(&NetworkConfig::default());
        let mut tasks = Vec::new();

        for player in 0..16u32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = registry.connect(player);
                let _ = registry.all_connections();
                registry.disconnect(handle.id());
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
