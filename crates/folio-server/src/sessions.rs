//! Live sessions and message fan-out.

use std::collections::HashMap;

use folio_types::{Session, SessionId};
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Outbound queue of one session, drained by its connection's writer task.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Entry {
    session: Session,
    outbox: Outbox,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Entry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session delivering to `outbox`.
    pub fn register(&mut self, outbox: Outbox) -> Session {
        let session = Session::new();
        self.sessions.insert(
            session.id,
            Entry {
                session: session.clone(),
                outbox,
            },
        );
        session
    }

    pub fn deregister(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id).map(|entry| entry.session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id).map(|entry| &entry.session)
    }

    pub fn username(&self, id: SessionId) -> Option<&str> {
        self.get(id).map(|s| s.username.as_str())
    }

    /// Returns false if the session is unknown.
    pub fn set_username(&mut self, id: SessionId, username: &str) -> bool {
        match self.sessions.get_mut(&id) {
            Some(entry) => {
                entry.session.username = username.to_string();
                true
            }
            None => false,
        }
    }

    /// Queue `msg` for one session. Returns false if it could not be queued.
    pub fn send_to(&self, id: SessionId, msg: ServerMessage) -> bool {
        let Some(entry) = self.sessions.get(&id) else {
            tracing::warn!(session = %id.short(), "send to unknown session");
            return false;
        };
        if entry.outbox.send(msg).is_err() {
            tracing::warn!(session = %id.short(), "outbox closed, message dropped");
            return false;
        }
        true
    }

    /// Queue `msg` for every session except `exclude`. Returns the number of
    /// sessions it was queued for.
    pub fn broadcast(&self, msg: &ServerMessage, exclude: Option<SessionId>) -> usize {
        let mut delivered = 0;
        for (id, entry) in &self.sessions {
            if Some(*id) == exclude {
                continue;
            }
            if entry.outbox.send(msg.clone()).is_err() {
                tracing::warn!(session = %id.short(), "outbox closed, skipping broadcast");
                continue;
            }
            delivered += 1;
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> ServerMessage {
        ServerMessage::HeartbeatAck {
            server_time: folio_types::now(),
        }
    }

    #[test]
    fn test_register_assigns_default_name() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = registry.register(tx);
        assert!(session.username.starts_with("User_"));
        assert_eq!(registry.username(session.id), Some(session.username.as_str()));

        assert!(registry.set_username(session.id, "Alice"));
        assert_eq!(registry.username(session.id), Some("Alice"));
        assert!(!registry.set_username(SessionId::new(), "Ghost"));
    }

    #[test]
    fn test_broadcast_excludes_and_skips_dead() {
        let mut registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, rx_c) = mpsc::unbounded_channel();
        let a = registry.register(tx_a);
        registry.register(tx_b);
        registry.register(tx_c);
        drop(rx_c);

        assert_eq!(registry.broadcast(&heartbeat(), Some(a.id)), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_deregister() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = registry.register(tx);
        assert!(registry.send_to(session.id, heartbeat()));
        assert_eq!(registry.deregister(session.id).map(|s| s.id), Some(session.id));
        assert!(!registry.send_to(session.id, heartbeat()));
        assert!(registry.is_empty());
    }
}
