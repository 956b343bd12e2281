//! Wire protocol for the realtime connection.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": {...}}`. Inbound
//! frames decode into the closed [`ClientMessage`] enum; replies and
//! broadcasts are [`ServerMessage`].

use folio_types::{BlockMetadata, DocumentId, SessionId, Timestamp, VersionId};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;

// ============================================================================
// Inbound
// ============================================================================

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    SetUsername(SetUsername),
    Heartbeat {},
    LockBlock(BlockRef),
    UnlockBlock(BlockRef),
    UpdateDocument(UpdateDocument),
    UpdateTableOptions(UpdateTableOptions),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetUsername {
    pub username: String,
}

/// A block within a document, as named by lock requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRef {
    #[serde(deserialize_with = "lenient_document_id")]
    pub document_id: DocumentId,
    pub block_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDocument {
    #[serde(deserialize_with = "lenient_document_id")]
    pub document_id: DocumentId,
    pub block_id: String,
    #[serde(default)]
    pub content: String,
    pub metadata: BlockMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTableOptions {
    #[serde(deserialize_with = "lenient_document_id")]
    pub document_id: DocumentId,
    pub table_id: String,
    pub options_json: OptionsJson,
}

/// Table options as sent by a client: already-encoded JSON text or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionsJson {
    Text(String),
    Object(Map<String, Value>),
}

impl OptionsJson {
    /// The options as JSON text, ready for storage.
    pub fn to_json_string(&self) -> String {
        match self {
            OptionsJson::Text(text) => text.clone(),
            OptionsJson::Object(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

/// Accept `7` or `"7"`.
fn lenient_document_id<'de, D: Deserializer<'de>>(d: D) -> Result<DocumentId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(DocumentId::new(n)),
        Raw::Text(text) => text
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid document_id: {text:?}"))),
    }
}

/// Envelope with the payload still undecoded, so a missing payload can be
/// read as `{}`.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl ClientMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|e| DispatchError::Protocol(e.to_string()))?;
        let envelope = serde_json::json!({
            "type": raw.kind,
            "payload": raw.payload.unwrap_or_else(|| Value::Object(Map::new())),
        });
        serde_json::from_value(envelope).map_err(|e| DispatchError::Protocol(e.to_string()))
    }

    /// Type tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SetUsername(_) => "set_username",
            ClientMessage::Heartbeat {} => "heartbeat",
            ClientMessage::LockBlock(_) => "lock_block",
            ClientMessage::UnlockBlock(_) => "unlock_block",
            ClientMessage::UpdateDocument(_) => "update_document",
            ClientMessage::UpdateTableOptions(_) => "update_table_options",
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Messages the server sends, as replies or broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionAck {
        session_id: SessionId,
        username: String,
    },
    HeartbeatAck {
        server_time: Timestamp,
    },
    LockDenied {
        document_id: DocumentId,
        block_id: String,
        locked_by: String,
        timestamp: Timestamp,
    },
    BlockLocked {
        document_id: DocumentId,
        block_id: String,
        locked_by: String,
        timestamp: Timestamp,
    },
    BlockUnlocked {
        document_id: DocumentId,
        block_id: String,
        unlocked_by: String,
        timestamp: Timestamp,
    },
    DocumentUpdated {
        document_id: DocumentId,
        version_id: VersionId,
        block_id: String,
        content_html: String,
        metadata: BlockMetadata,
        timestamp: Timestamp,
    },
    TableOptionsUpdated {
        document_id: DocumentId,
        table_id: String,
        options_json: OptionsJson,
    },
    VersionCreated {
        document_id: DocumentId,
        version_id: VersionId,
        changed_by: String,
        timestamp: Timestamp,
    },
    Error {
        error_code: u16,
        error_message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
