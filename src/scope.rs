//! Resource scope owning live connections.
//!
//! Every connection attempt that reaches transport setup is registered here
//! and removed exactly once when its transport shuts down. Dropping the
//! scope does not close connections; close them first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionId};

/// Shared registry of live connections.
#[derive(Clone, Default)]
pub struct ResourceScope {
    inner: Arc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<ConnectionId, Connection>>,
}

impl ResourceScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections not yet shut down.
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Look up a live connection.
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.inner.live.lock().get(&id).cloned()
    }

    /// Ids of all live connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.live.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Close every live connection with a success code.
    pub fn close_all(&self) {
        let live: Vec<Connection> = self.inner.live.lock().values().cloned().collect();
        for connection in live {
            connection.close();
        }
    }

    pub(crate) fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, connection: Connection) {
        self.inner.live.lock().insert(connection.id(), connection);
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.inner.live.lock().remove(&id)
    }
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::recording::RecordingTransport;

    fn register(scope: &ResourceScope) -> (Connection, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(scope.allocate_id(), transport.clone());
        scope.insert(connection.clone());
        (connection, transport)
    }

    #[test]
    fn test_ids_are_unique() {
        let scope = ResourceScope::new();
        let a = scope.allocate_id();
        let b = scope.allocate_id();
        assert_ne!(a, b);
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn test_insert_and_remove_once() {
        let scope = ResourceScope::new();
        let (connection, _) = register(&scope);

        assert_eq!(scope.live_count(), 1);
        assert!(scope.get(connection.id()).is_some());
        assert!(scope.remove(connection.id()).is_some());
        assert!(scope.remove(connection.id()).is_none());
        assert_eq!(scope.live_count(), 0);
    }

    #[test]
    fn test_close_all() {
        let scope = ResourceScope::new();
        let (_, first) = register(&scope);
        let (_, second) = register(&scope);

        assert_eq!(scope.connection_ids().len(), 2);
        scope.close_all();

        assert_eq!(first.closes(), vec![Ok(())]);
        assert_eq!(second.closes(), vec![Ok(())]);
    }

    #[test]
    fn test_clones_share_state() {
        let scope = ResourceScope::new();
        let other = scope.clone();
        register(&scope);
        assert_eq!(other.live_count(), 1);
    }
}
