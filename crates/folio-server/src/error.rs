//! Errors surfaced to clients by the dispatch layer.

use folio_kernel::{ErrorKind, StoreError};
use thiserror::Error;

use crate::protocol::ServerMessage;

/// Why a client request was refused.
///
/// Each variant maps to one wire code (see [`DispatchError::code`]). None of
/// them closes the connection.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Missing or malformed field; nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// Unknown document, version, block, table, or template.
    #[error("{0}")]
    NotFound(String),

    /// Block is locked by another session.
    #[error("{0}")]
    Conflict(String),

    /// Storage failed and was rolled back. The message is generic.
    #[error("{0}")]
    Storage(String),

    /// Unparseable message or unknown type tag.
    #[error("invalid message: {0}")]
    Protocol(String),
}

impl DispatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DispatchError::Validation(msg.into())
    }

    pub fn locked_by(holder: &str) -> Self {
        DispatchError::Conflict(format!("block is locked by {holder}"))
    }

    /// HTTP-style status code used on the wire.
    pub fn code(&self) -> u16 {
        match self {
            DispatchError::Validation(_) | DispatchError::Protocol(_) => 400,
            DispatchError::NotFound(_) => 404,
            DispatchError::Conflict(_) => 409,
            DispatchError::Storage(_) => 500,
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            error_code: self.code(),
            error_message: self.to_string(),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err.kind() {
            ErrorKind::Validation => DispatchError::Validation(err.to_string()),
            ErrorKind::NotFound => DispatchError::NotFound(err.to_string()),
            ErrorKind::Storage => {
                tracing::error!(error = %err, "storage failure");
                DispatchError::Storage("storage failure".to_string())
            }
        }
    }
}
