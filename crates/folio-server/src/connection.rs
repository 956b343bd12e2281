//! Per-connection state machine.
//!
//! ```text
//! Connected ──first frame──▶ Active ──close──▶ Closed
//!     └────────────────close─────────────────────┘
//! ```

use std::sync::Arc;

use folio_types::SessionId;

use crate::hub::Hub;
use crate::sessions::Outbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, nothing received yet.
    Connected,
    /// At least one frame handled.
    Active,
    Closed,
}

/// One client connection bound to its hub session.
pub struct Connection {
    hub: Arc<Hub>,
    session: SessionId,
    state: ConnectionState,
}

impl Connection {
    /// Register with the hub. The `session_ack` is queued on `outbox`.
    pub async fn open(hub: Arc<Hub>, outbox: Outbox) -> Self {
        let session = hub.connect(outbox).await.id;
        Self {
            hub,
            session,
            state: ConnectionState::Connected,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handle one inbound text frame. Frames after close are dropped.
    pub async fn receive(&mut self, text: &str) {
        if self.state == ConnectionState::Closed {
            tracing::warn!(session = %self.session.short(), "frame after close dropped");
            return;
        }
        self.state = ConnectionState::Active;
        self.hub.handle_text(self.session, text).await;
    }

    /// Deregister and release held locks. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.hub.disconnect(self.session).await;
        self.state = ConnectionState::Closed;
    }
}
