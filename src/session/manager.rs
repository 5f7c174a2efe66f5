//! Session manager for tracking all connected controllers

use super::connection::SessionHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Diagnostic view of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub peer: String,
    pub connected_for: Duration,
    pub active_tasks: usize,
}

/// Manages all active controller sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<u64, SessionHandle>>,
    next_id: AtomicU64,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new session
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a new controller session
    pub async fn register(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id, handle);
    }

    /// Unregister a controller session
    pub async fn unregister(&self, id: u64) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Get a session handle by id
    pub async fn get(&self, id: u64) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Snapshot of every connected session, ordered by id
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions
            .values()
            .map(|handle| SessionInfo {
                id: handle.id,
                peer: handle.peer.clone(),
                connected_for: handle.connected_at.elapsed(),
                active_tasks: handle.active_tasks(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Get the number of connected controllers
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(manager: &SessionManager, peer: &str) -> SessionHandle {
        SessionHandle::new(manager.next_id(), peer.into(), tokio::io::sink())
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let manager = SessionManager::new();
        let first = handle(&manager, "10.0.0.1:5000");
        let second = handle(&manager, "10.0.0.2:5000");
        assert_ne!(first.id, second.id);

        manager.register(second.clone()).await;
        manager.register(first.clone()).await;
        assert_eq!(manager.count().await, 2);

        let peers: Vec<String> = manager.list().await.into_iter().map(|info| info.peer).collect();
        assert_eq!(peers, vec!["10.0.0.1:5000", "10.0.0.2:5000"]);
        assert!(manager.get(first.id).await.is_some());

        assert!(manager.unregister(first.id).await);
        assert!(!manager.unregister(first.id).await);
        assert_eq!(manager.count().await, 1);
        assert!(manager.get(first.id).await.is_none());
    }
}
