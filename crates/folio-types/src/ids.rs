//! Typed identifiers for documents, versions, block rows, and sessions.
//!
//! Storage-assigned identities (`DocumentId`, `VersionId`, `BlockRowId`) wrap
//! SQLite integer row ids and display as plain numbers. `SessionId` wraps a
//! UUIDv7 generated per connection and is never persisted.
//!
//! A block's *attribute id* is not one of these: it is the durable string
//! identity a block keeps across versions (see [`crate::block`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A document identifier (SQLite row id).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(i64);

/// A version identifier (SQLite row id, monotonic across all documents).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(i64);

/// An immutable block row identifier (SQLite row id).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockRowId(i64);

/// A connection session identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

// ── Row ids ─────────────────────────────────────────────────────────────────

macro_rules! impl_row_id {
    ($T:ident, $name:literal) => {
        impl $T {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw SQLite row id.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $T {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $T {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_row_id!(DocumentId, "DocumentId");
impl_row_id!(VersionId, "VersionId");
impl_row_id!(BlockRowId, "BlockRowId");

// ── Session ids ─────────────────────────────────────────────────────────────

impl SessionId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters, for logs only.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Last 4 hex characters. These come from the random part of a UUIDv7,
    /// so sessions opened in the same millisecond still differ.
    pub fn tail(&self) -> String {
        let hex = self.to_hex();
        hex[hex.len() - 4..].to_string()
    }

    /// Full 32-character hex string (no hyphens).
    pub fn to_hex(&self) -> String {
        self.0.as_simple().to_string()
    }

    /// Parse from a hex string or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short())
    }
}

// ── Attribute ids ───────────────────────────────────────────────────────────

/// Mint a fresh attribute id for a new block or synthesized table.
pub fn new_attribute_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Attribute id of the options block belonging to table `parent_id`.
pub fn options_attribute_id(parent_id: &str) -> String {
    format!("options_{parent_id}")
}

// ============================================================================
// Tests
// ============================================================================
