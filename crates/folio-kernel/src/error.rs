//! Error types for the document store.

use folio_types::{DocumentId, VersionId};
use thiserror::Error;

/// Broad classes of failure, used by callers to pick a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; nothing was written.
    Validation,
    /// A referenced document, version, block, table, or template is missing.
    NotFound,
    /// Storage or serialization failure; the transaction was rolled back.
    Storage,
}

/// Errors that can occur in document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Input failed validation before any storage access.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Document does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// Document exists but has no versions.
    #[error("document {0} has no versions")]
    NoVersions(DocumentId),

    /// Version does not exist or belongs to another document.
    #[error("version {version} not found for document {document}")]
    VersionNotFound {
        document: DocumentId,
        version: VersionId,
    },

    /// No block with this attribute id in the latest version.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// No cells for this table id in the latest version.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Table has no options block.
    #[error("no options block for table: {0}")]
    TableOptionsNotFound(String),

    /// Template name not known to the template store.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The resulting block set would break table structure or id uniqueness.
    #[error("version invariant violated: {0}")]
    Invariant(String),

    /// SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Template file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure on stored data.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) | StoreError::Invariant(_) => ErrorKind::Validation,
            StoreError::DocumentNotFound(_)
            | StoreError::NoVersions(_)
            | StoreError::VersionNotFound { .. }
            | StoreError::BlockNotFound(_)
            | StoreError::TableNotFound(_)
            | StoreError::TableOptionsNotFound(_)
            | StoreError::TemplateNotFound(_) => ErrorKind::NotFound,
            StoreError::Storage(_)
            | StoreError::Io(_)
            | StoreError::Json(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;
