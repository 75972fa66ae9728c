//! Registry of live sessions, keyed by connection.
//!
//! Readers take a snapshot and iterate it with no lock held, so a long
//! iteration (server stop) never blocks accepts.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::connection::ConnectionId;
use super::session::SmppSession;

/// Session registry
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, SmppSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a connection
    pub async fn insert(&self, connection: ConnectionId, session: SmppSession) {
        let session_id = session.id();
        self.sessions.write().await.insert(connection, session);
        debug!(%connection, session = session_id, "session registered");
    }

    /// Unregister the session of a connection; `None` if it was already gone
    pub async fn remove(&self, connection: ConnectionId) -> Option<SmppSession> {
        let removed = self.sessions.write().await.remove(&connection);
        if let Some(session) = &removed {
            debug!(%connection, session = session.id(), "session unregistered");
        }
        removed
    }

    /// Copy of the current registrations
    pub async fn snapshot(&self) -> Vec<(ConnectionId, SmppSession)> {
        let sessions = self.sessions.read().await;
        let mut entries: Vec<_> = sessions
            .iter()
            .map(|(connection, session)| (*connection, session.clone()))
            .collect();
        entries.sort_by_key(|(connection, _)| *connection);
        entries
    }

    /// Get the number of registered sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Check if a connection has a registered session
    pub async fn contains(&self, connection: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&connection)
    }
}
