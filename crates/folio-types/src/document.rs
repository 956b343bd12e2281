//! Document and version metadata.
//!
//! A `Document` owns an append-only history of `Version`s. Versions are never
//! edited or removed; reverting creates a new one.

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::ids::{DocumentId, VersionId};

/// Document record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub title: String,
    pub created_at: Timestamp,
    /// Bumped by every committed version and by title edits.
    pub last_modified: Timestamp,
}

/// One immutable version of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub id: VersionId,
    pub document_id: DocumentId,
    /// Author label, e.g. `alice` or `alice (reverted to v3)`.
    pub changed_by: String,
    pub created_at: Timestamp,
}

impl VersionMeta {
    /// Author label recorded for a revert.
    pub fn revert_label(author: &str, target: VersionId) -> String {
        format!("{author} (reverted to v{target})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_label() {
        assert_eq!(
            VersionMeta::revert_label("alice", VersionId::new(3)),
            "alice (reverted to v3)"
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let meta = VersionMeta {
            id: VersionId::new(2),
            document_id: DocumentId::new(1),
            changed_by: "bob".into(),
            created_at: crate::now(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: VersionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, parsed);
    }
}
