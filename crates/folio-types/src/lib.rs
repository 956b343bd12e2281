//! Shared identity, block, and template types for Folio.
//!
//! This crate has **no internal folio dependencies**. It is the leaf that the
//! kernel and server build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Document (DocumentId)
//!     └── owns an append-only history of Version (VersionId)
//!
//! Version (VersionId) ← immutable snapshot
//!     └── references many Block rows, each at an order position
//!
//! Block (BlockRowId) ← immutable row
//!     └── attribute_id survives edits (new row, same attribute_id)
//!     └── parent_id groups table cells + options into a table
//!
//! Session (SessionId) ← one live connection, ephemeral display name
//! ```
//!
//! # Key Types
//!
//! |------------------|-------------------------------------------------|
//! | Type             | Purpose                                         |
//! |------------------|-------------------------------------------------|
//! | [`Block`]        | Stored block at its order within a version      |
//! | [`BlockDraft`]   | Block fields before a row id is assigned        |
//! | [`BlockMetadata`]| Optional field overrides sent with an edit      |
//! | [`BlockType`]    | text, heading, hr, table-cell, table-options    |
//! | [`InsertKind`]   | What an insert adds (a block type or a table)   |
//! | [`TemplateItem`] | One entry of a document template                |
//! | [`DocumentMeta`] | Document record                                 |
//! | [`VersionMeta`]  | Version record                                  |
//! | [`Session`]      | Connection id + display name                    |
//! |------------------|-------------------------------------------------|

pub mod block;
pub mod document;
pub mod ids;
pub mod session;
pub mod template;

pub use block::{
    Block, BlockDraft, BlockMetadata, BlockType, InsertKind, default_table_options,
    DEFAULT_TABLE_COLS, DEFAULT_TABLE_COLUMNS, DEFAULT_TABLE_ROWS,
};
pub use document::{DocumentMeta, VersionMeta};
pub use ids::{
    BlockRowId, DocumentId, SessionId, VersionId, new_attribute_id, options_attribute_id,
};
pub use session::Session;
pub use template::{SimpleItem, TableItem, TemplateItem};

/// Wall-clock timestamps, millisecond precision.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current time truncated to milliseconds, so it survives a storage round trip.
pub fn now() -> Timestamp {
    from_millis(chrono::Utc::now().timestamp_millis())
}

/// Timestamp from Unix milliseconds. Out-of-range values map to the epoch.
pub fn from_millis(ms: i64) -> Timestamp {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
