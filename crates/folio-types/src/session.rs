//! Session metadata types.
//!
//! A `Session` records that a client connected. It carries the ephemeral
//! display name shown on locks; there is no persisted user identity.

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::ids::SessionId;

/// One live connection and its display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Globally unique session identifier (UUIDv7, time-ordered).
    pub id: SessionId,
    /// Display name; starts as [`Session::default_username`].
    pub username: String,
    pub connected_at: Timestamp,
}

impl Session {
    /// Create a session with a fresh id and its default name.
    pub fn new() -> Self {
        let id = SessionId::new();
        Self {
            id,
            username: Self::default_username(id),
            connected_at: crate::now(),
        }
    }

    /// `User_` followed by the id's last four hex characters.
    pub fn default_username(id: SessionId) -> String {
        format!("User_{}", id.tail())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
