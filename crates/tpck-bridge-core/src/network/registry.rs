//! Shared registry of live client connections.
//!
//! The accept loop inserts, the bridge loop snapshots and evicts, and the
//! shutdown path drains. Every operation holds the one lock for its whole
//! duration; the backing `Vec` never leaves it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::connection::{Connection, ConnectionId};

/// Thread-safe, cloneable handle to the connection list.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<Vec<Connection>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Connection>> {
        // Entries stay consistent even if a holder panicked.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection. A connection whose id is already present is ignored.
    pub fn insert(&self, connection: Connection) {
        let mut entries = self.lock();
        if entries.iter().all(|c| c.id() != connection.id()) {
            entries.push(connection);
        }
    }

    /// Remove a connection without closing it.
    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        let mut entries = self.lock();
        let index = entries.iter().position(|c| c.id() == id)?;
        Some(entries.remove(index))
    }

    #[must_use]
    pub fn find(&self, id: ConnectionId) -> Option<Connection> {
        self.lock().iter().find(|c| c.id() == id).cloned()
    }

    /// Copy of the current entries, safe to use after the lock is released.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Connection> {
        self.lock().clone()
    }

    /// Empty the registry, returning what it held.
    #[must_use]
    pub fn drain_all(&self) -> Vec<Connection> {
        std::mem::take(&mut *self.lock())
    }

    /// Close and remove every listed connection still present, under a
    /// single acquisition of the lock. Returns how many were removed.
    pub fn evict(&self, ids: &[ConnectionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|c| {
            if ids.contains(&c.id()) {
                c.close();
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn connections(n: usize) -> (Vec<Connection>, Vec<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conns = Vec::new();
        let mut clients = Vec::new();
        for _ in 0..n {
            clients.push(TcpStream::connect(addr).await.unwrap());
            let (stream, peer) = listener.accept().await.unwrap();
            conns.push(Connection::new(stream, peer));
        }
        (conns, clients)
    }

    #[tokio::test]
    async fn test_insert_find_remove() {
        let (conns, _clients) = connections(2).await;
        let registry = ConnectionRegistry::new();
        registry.insert(conns[0].clone());
        registry.insert(conns[1].clone());
        registry.insert(conns[0].clone());
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.find(conns[1].id()).map(|c| c.id()), Some(conns[1].id()));
        assert!(registry.remove(conns[1].id()).is_some());
        assert!(registry.find(conns[1].id()).is_none());
        assert!(registry.remove(conns[1].id()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let (conns, _clients) = connections(2).await;
        let registry = ConnectionRegistry::new();
        registry.insert(conns[0].clone());

        let snapshot = registry.snapshot();
        registry.insert(conns[1].clone());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_all_empties() {
        let (conns, _clients) = connections(3).await;
        let registry = ConnectionRegistry::new();
        for c in &conns {
            registry.insert(c.clone());
        }

        let drained = registry.drain_all();
        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());
        assert!(registry.drain_all().is_empty());
    }

    #[tokio::test]
    async fn test_evict_only_listed() {
        let (conns, _clients) = connections(3).await;
        let registry = ConnectionRegistry::new();
        for c in &conns {
            registry.insert(c.clone());
        }

        let unknown = {
            let (extra, _c) = connections(1).await;
            extra[0].id()
        };
        assert_eq!(registry.evict(&[conns[1].id(), unknown]), 1);
        let remaining: Vec<_> = registry.snapshot().iter().map(Connection::id).collect();
        assert_eq!(remaining, vec![conns[0].id(), conns[2].id()]);
        assert_eq!(registry.evict(&[]), 0);
    }
}
