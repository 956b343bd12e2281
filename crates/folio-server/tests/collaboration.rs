//! Integration tests for realtime collaboration through the hub.
//!
//! # Tiers
//!
//! - **Tier 1:** Locks: handshake, contention, release on disconnect, renames
//! - **Tier 2:** Edits: `update_document` and `update_table_options` with
//!   their lock rules and broadcasts
//! - **Tier 3:** Protocol robustness: bad frames, closed connections
//! - **Tier 4:** HTTP-side mutations: lock checks and `version_created`
//! - **Tier 5:** The assembled server over a real TCP socket

use std::sync::Arc;

use folio_kernel::DocumentStore;
use folio_server::protocol::{BlockRef, UpdateDocument, UpdateTableOptions};
use folio_server::{
    ClientMessage, Connection, ConnectionState, DispatchError, Hub, LockInfo, OptionsJson,
    ServerMessage,
};
use folio_types::{Block, BlockMetadata, BlockType, DocumentId, InsertKind};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

// ============================================================================
// Shared test setup
// ============================================================================

/// Hub over an in-memory store holding one document built from the default
/// template (heading, text, a 2x2 table).
fn setup() -> (Arc<Hub>, DocumentId) {
    let store = Arc::new(DocumentStore::in_memory().unwrap());
    let (doc, _) = store
        .create_from_template("Shared notes", "default", "tester")
        .unwrap();
    (Arc::new(Hub::new(store)), doc.id)
}

struct Client {
    conn: Connection,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    /// Connect, optionally rename, and discard the handshake traffic.
    async fn join(hub: &Arc<Hub>, name: Option<&str>) -> Client {
        let (tx, rx) = unbounded_channel();
        let conn = Connection::open(hub.clone(), tx).await;
        let mut client = Client { conn, rx };
        if let Some(name) = name {
            client
                .send(&serde_json::json!({
                    "type": "set_username",
                    "payload": { "username": name },
                }))
                .await;
        }
        client.drain();
        client
    }

    async fn send(&mut self, msg: &serde_json::Value) {
        self.conn.receive(&msg.to_string()).await;
    }

    async fn send_msg(&mut self, msg: ClientMessage) {
        let text = serde_json::to_string(&msg).unwrap();
        self.conn.receive(&text).await;
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn lock(doc: DocumentId, block: &str) -> ClientMessage {
    ClientMessage::LockBlock(BlockRef {
        document_id: doc,
        block_id: block.to_string(),
    })
}

fn unlock(doc: DocumentId, block: &str) -> ClientMessage {
    ClientMessage::UnlockBlock(BlockRef {
        document_id: doc,
        block_id: block.to_string(),
    })
}

fn update(doc: DocumentId, block: &str, content: &str) -> ClientMessage {
    ClientMessage::UpdateDocument(UpdateDocument {
        document_id: doc,
        block_id: block.to_string(),
        content: content.to_string(),
        metadata: BlockMetadata::default(),
    })
}

fn blocks(hub: &Hub, doc: DocumentId) -> Vec<Block> {
    hub.store().latest_blocks(doc).unwrap()
}

fn first_of(hub: &Hub, doc: DocumentId, block_type: BlockType) -> Block {
    blocks(hub, doc)
        .into_iter()
        .find(|b| b.block_type == block_type)
        .unwrap()
}

fn error_code(msgs: &[ServerMessage]) -> Option<u16> {
    msgs.iter().find_map(|m| match m {
        ServerMessage::Error { error_code, .. } => Some(*error_code),
        _ => None,
    })
}

// ============================================================================
// Tier 1: Locks
// ============================================================================

#[tokio::test]
async fn test_connect_sends_session_ack() {
    let (hub, _) = setup();
    let (tx, mut rx) = unbounded_channel();
    let conn = Connection::open(hub.clone(), tx).await;

    assert_eq!(conn.state(), ConnectionState::Connected);
    match rx.try_recv().unwrap() {
        ServerMessage::SessionAck { session_id, username } => {
            assert_eq!(session_id, conn.session());
            assert!(username.starts_with("User_"), "{username}");
            assert_eq!(username.len(), "User_".len() + 4);
        }
        other => panic!("expected session_ack, got {other:?}"),
    }
    assert_eq!(hub.session_count().await, 1);
}

#[tokio::test]
async fn test_lock_contention_released_on_disconnect() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    a.send_msg(lock(doc, "x")).await;
    assert!(b.drain().iter().any(|m| matches!(
        m,
        ServerMessage::BlockLocked { block_id, locked_by, .. } if block_id == "x" && locked_by == "A"
    )));
    a.drain();

    b.send_msg(lock(doc, "x")).await;
    let replies = b.drain();
    assert!(
        matches!(&replies[..], [ServerMessage::LockDenied { locked_by, .. }] if locked_by == "A"),
        "{replies:?}"
    );
    assert!(a.drain().is_empty(), "denial goes to the requester only");

    a.conn.close().await;
    assert!(b.drain().iter().any(|m| matches!(
        m,
        ServerMessage::BlockUnlocked { block_id, unlocked_by, .. } if block_id == "x" && unlocked_by == "A"
    )));
    assert!(hub.locks(doc).await.is_empty());

    let mut c = Client::join(&hub, Some("C")).await;
    c.send_msg(lock(doc, "x")).await;
    assert!(c.drain().iter().any(|m| matches!(
        m,
        ServerMessage::BlockLocked { locked_by, .. } if locked_by == "C"
    )));
    assert_eq!(
        hub.locks(doc).await,
        vec![LockInfo {
            block_id: "x".into(),
            locked_by: "C".into(),
        }]
    );
}

#[tokio::test]
async fn test_relock_by_holder_is_idempotent() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, None).await;

    a.send_msg(lock(doc, "x")).await;
    b.drain();
    a.drain();
    a.send_msg(lock(doc, "x")).await;

    assert!(matches!(&a.drain()[..], [ServerMessage::BlockLocked { .. }]));
    assert!(b.drain().is_empty());
    assert_eq!(hub.locks(doc).await.len(), 1);
}

#[tokio::test]
async fn test_unlock_rules() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    a.send_msg(lock(doc, "x")).await;
    b.drain();

    b.send_msg(unlock(doc, "x")).await;
    assert_eq!(error_code(&b.drain()), Some(409));
    assert_eq!(hub.locks(doc).await.len(), 1);

    b.send_msg(unlock(doc, "never-locked")).await;
    assert!(b.drain().is_empty());

    a.send_msg(unlock(doc, "x")).await;
    assert!(b.drain().iter().any(|m| matches!(
        m,
        ServerMessage::BlockUnlocked { unlocked_by, .. } if unlocked_by == "A"
    )));
    assert!(hub.locks(doc).await.is_empty());
}

#[tokio::test]
async fn test_set_username_renames_held_locks() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, None).await;
    let mut b = Client::join(&hub, None).await;

    a.send_msg(lock(doc, "x")).await;
    b.drain();
    a.send(&serde_json::json!({
        "type": "set_username",
        "payload": { "username": "  Alice  " },
    }))
    .await;

    assert!(a.drain().iter().any(|m| matches!(
        m,
        ServerMessage::SessionAck { username, .. } if username == "Alice"
    )));
    assert!(b.drain().iter().any(|m| matches!(
        m,
        ServerMessage::BlockLocked { locked_by, .. } if locked_by == "Alice"
    )));
    assert_eq!(hub.locks(doc).await[0].locked_by, "Alice");

    a.send(&serde_json::json!({
        "type": "set_username",
        "payload": { "username": "   " },
    }))
    .await;
    assert_eq!(error_code(&a.drain()), Some(400));
}

// ============================================================================
// Tier 2: Edits
// ============================================================================

#[tokio::test]
async fn test_update_document_broadcasts_to_others() {
    let (hub, doc) = setup();
    let heading = first_of(&hub, doc, BlockType::Heading);
    let text_before = first_of(&hub, doc, BlockType::Text);
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    a.send_msg(update(doc, &heading.attribute_id, "Renamed")).await;

    let seen_by_b = b.drain();
    let updated = seen_by_b
        .iter()
        .find_map(|m| match m {
            ServerMessage::DocumentUpdated {
                block_id,
                content_html,
                ..
            } => Some((block_id.clone(), content_html.clone())),
            _ => None,
        })
        .expect("document_updated broadcast");
    assert_eq!(updated.0, heading.attribute_id);
    assert_eq!(updated.1, "Renamed");
    assert!(
        !a.drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::DocumentUpdated { .. })),
        "editor does not get its own update"
    );

    // The edit took the lock and keeps it.
    assert_eq!(hub.locks(doc).await[0].locked_by, "A");

    let after = first_of(&hub, doc, BlockType::Heading);
    assert_eq!(after.attribute_id, heading.attribute_id);
    assert_eq!(after.content, "Renamed");
    assert_ne!(after.row_id, heading.row_id);
    assert_eq!(first_of(&hub, doc, BlockType::Text).row_id, text_before.row_id);
    assert_eq!(hub.store().versions(doc).unwrap()[0].changed_by, "A");
}

#[tokio::test]
async fn test_cell_edit_broadcasts_raw_content() {
    let (hub, doc) = setup();
    let cell = first_of(&hub, doc, BlockType::TableCell);
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    a.send_msg(update(doc, &cell.attribute_id, "hello")).await;

    let content = b
        .drain()
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::DocumentUpdated { content_html, .. } => Some(content_html),
            _ => None,
        })
        .expect("document_updated broadcast");
    assert_eq!(content, "hello");
}

#[tokio::test]
async fn test_update_denied_while_locked_by_other() {
    let (hub, doc) = setup();
    let heading = first_of(&hub, doc, BlockType::Heading);
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    a.send_msg(lock(doc, &heading.attribute_id)).await;
    b.drain();
    b.send_msg(update(doc, &heading.attribute_id, "Sneaky")).await;

    assert!(
        matches!(&b.drain()[..], [ServerMessage::LockDenied { locked_by, .. }] if locked_by == "A")
    );
    assert_eq!(hub.store().versions(doc).unwrap().len(), 1);
    assert_eq!(first_of(&hub, doc, BlockType::Heading).content, heading.content);
}

#[tokio::test]
async fn test_failed_update_releases_lock_it_took() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, None).await;

    a.send_msg(update(doc, "no-such-block", "x")).await;

    let replies = a.drain();
    assert_eq!(error_code(&replies), Some(404));
    assert!(b.drain().iter().any(|m| matches!(m, ServerMessage::BlockUnlocked { .. })));
    assert!(hub.locks(doc).await.is_empty());
    assert_eq!(hub.store().versions(doc).unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_update_keeps_lock_held_before() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, Some("A")).await;

    a.send_msg(lock(doc, "no-such-block")).await;
    a.send_msg(update(doc, "no-such-block", "x")).await;

    assert_eq!(error_code(&a.drain()), Some(404));
    assert_eq!(hub.locks(doc).await.len(), 1);
}

#[tokio::test]
async fn test_update_table_options() {
    let (hub, doc) = setup();
    let options = first_of(&hub, doc, BlockType::TableOptions);
    let table_id = options.parent_id.clone().unwrap();
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    a.send_msg(lock(doc, &options.attribute_id)).await;
    b.drain();

    let change = |options_json: OptionsJson| {
        ClientMessage::UpdateTableOptions(UpdateTableOptions {
            document_id: doc,
            table_id: table_id.clone(),
            options_json,
        })
    };

    b.send_msg(change(OptionsJson::Text(r#"{"columns":["1px"]}"#.into())))
        .await;
    assert_eq!(error_code(&b.drain()), Some(409));
    assert_eq!(hub.store().versions(doc).unwrap().len(), 1);

    let mut object = serde_json::Map::new();
    object.insert("columns".into(), serde_json::json!(["80px", "20px"]));
    a.send_msg(change(OptionsJson::Object(object))).await;

    assert!(b.drain().iter().any(|m| matches!(
        m,
        ServerMessage::TableOptionsUpdated { table_id: t, .. } if *t == table_id
    )));
    let stored = first_of(&hub, doc, BlockType::TableOptions);
    assert_eq!(stored.attribute_id, options.attribute_id);
    let value: serde_json::Value = serde_json::from_str(&stored.content).unwrap();
    assert_eq!(value["columns"][0], "80px");

    a.send_msg(change(OptionsJson::Text("[1,2]".into()))).await;
    assert_eq!(error_code(&a.drain()), Some(400));
}

// ============================================================================
// Tier 3: Protocol robustness
// ============================================================================

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let (hub, _) = setup();
    let mut a = Client::join(&hub, None).await;

    for frame in [
        "garbage",
        r#"{"type":"summon","payload":{}}"#,
        r#"{"type":"lock_block","payload":{"document_id":"one","block_id":"x"}}"#,
        r#"{"type":"lock_block","payload":{"document_id":1,"block_id":""}}"#,
    ] {
        a.conn.receive(frame).await;
        assert_eq!(error_code(&a.drain()), Some(400), "{frame}");
    }
    assert_eq!(a.conn.state(), ConnectionState::Active);

    a.conn.receive(r#"{"type":"heartbeat"}"#).await;
    assert!(matches!(&a.drain()[..], [ServerMessage::HeartbeatAck { .. }]));
}

#[tokio::test]
async fn test_unknown_document_is_not_found() {
    let (hub, _) = setup();
    let mut a = Client::join(&hub, None).await;

    a.send_msg(update(DocumentId::new(999), "x", "y")).await;
    assert_eq!(error_code(&a.drain()), Some(404));
}

#[tokio::test]
async fn test_closed_connection_ignores_frames() {
    let (hub, doc) = setup();
    let mut a = Client::join(&hub, None).await;

    a.conn.close().await;
    a.conn.close().await;
    assert_eq!(a.conn.state(), ConnectionState::Closed);
    assert_eq!(hub.session_count().await, 0);

    a.send_msg(lock(doc, "x")).await;
    assert!(hub.locks(doc).await.is_empty());
}

// ============================================================================
// Tier 4: HTTP-side mutations
// ============================================================================

#[tokio::test]
async fn test_delete_refused_while_table_part_locked() {
    let (hub, doc) = setup();
    let cell = first_of(&hub, doc, BlockType::TableCell);
    let table_id = cell.parent_id.clone().unwrap();
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, None).await;

    a.send_msg(lock(doc, &cell.attribute_id)).await;
    let err = hub.delete_block(doc, &table_id, "http").await.unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));
    assert_eq!(err.code(), 409);
    assert_eq!(blocks(&hub, doc).len(), 7);

    a.send_msg(unlock(doc, &cell.attribute_id)).await;
    a.drain();
    b.drain();

    let removal = hub.delete_block(doc, &table_id, "http").await.unwrap();
    assert_eq!(removal.removed.len(), 5);
    let remaining = blocks(&hub, doc);
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining.iter().map(|b| b.order).collect::<Vec<_>>(), vec![0, 1]);

    for client in [&mut a, &mut b] {
        assert!(client.drain().iter().any(|m| matches!(
            m,
            ServerMessage::VersionCreated { version_id, changed_by, .. }
                if *version_id == removal.version.id && changed_by == "http"
        )));
    }
}

#[tokio::test]
async fn test_revert_refused_while_changed_block_locked() {
    let (hub, doc) = setup();
    let heading = first_of(&hub, doc, BlockType::Heading);
    let text = first_of(&hub, doc, BlockType::Text);
    let first = hub.store().versions(doc).unwrap()[0].id;
    let mut a = Client::join(&hub, Some("A")).await;
    let mut b = Client::join(&hub, Some("B")).await;

    // A keeps the heading lock after editing it.
    a.send_msg(update(doc, &heading.attribute_id, "Renamed")).await;
    let err = hub.revert(doc, first, "http").await.unwrap_err();
    assert_eq!(err.code(), 409);
    assert!(err.to_string().contains("A"), "{err}");
    assert_eq!(hub.store().versions(doc).unwrap().len(), 2);

    // A lock on a block the revert leaves alone does not block it.
    a.send_msg(unlock(doc, &heading.attribute_id)).await;
    b.send_msg(lock(doc, &text.attribute_id)).await;
    hub.revert(doc, first, "http").await.unwrap();
    assert_eq!(first_of(&hub, doc, BlockType::Heading).content, heading.content);
}

#[tokio::test]
async fn test_add_row_after_last_index_is_rejected() {
    let (hub, doc) = setup();
    let table_id = first_of(&hub, doc, BlockType::TableCell).parent_id.unwrap();

    let err = hub
        .add_table_row(doc, &table_id, Some(u32::MAX), "http")
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
    assert_eq!(blocks(&hub, doc).len(), 7);
}

#[tokio::test]
async fn test_http_mutations_announce_versions() {
    let (hub, doc) = setup();
    let heading = first_of(&hub, doc, BlockType::Heading);
    let table_id = first_of(&hub, doc, BlockType::TableCell).parent_id.unwrap();
    let mut a = Client::join(&hub, None).await;

    let insertion = hub
        .add_block(doc, InsertKind::Text, Some(&heading.attribute_id), "http")
        .await
        .unwrap();
    assert_eq!(insertion.added.len(), 1);
    assert_eq!(insertion.added[0].order, 1);

    let row = hub.add_table_row(doc, &table_id, None, "http").await.unwrap();
    assert_eq!(row.row_index, 2);
    assert_eq!(row.cells.len(), 2);

    let first = hub.store().versions(doc).unwrap().last().unwrap().id;
    let reverted = hub.revert(doc, first, "http").await.unwrap();
    assert_eq!(reverted.changed_by, format!("http (reverted to v{first})"));

    let announced = a
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::VersionCreated { .. }))
        .count();
    assert_eq!(announced, 3);
    assert_eq!(blocks(&hub, doc).len(), 7);
}

// ============================================================================
// Tier 5: Assembled server
// ============================================================================

mod over_tcp {
    use folio_server::{FolioServer, ServerConfig, serve};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_http_reads() {
        let dir = tempfile::tempdir().unwrap();
        let server = FolioServer::new(ServerConfig::ephemeral(dir.path()));
        let store = server.open_store().unwrap();
        let (doc, _) = store
            .create_from_template("Over the wire", "default", "tester")
            .unwrap();

        let listener = TcpListener::bind(server.config().bind_addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(Hub::new(store));
        tokio::spawn(serve(listener, hub));

        let templates = get(addr, "/api/templates").await;
        assert!(templates.starts_with("HTTP/1.1 200"), "{templates}");
        assert!(templates.contains("\"default\""));

        let document = get(addr, &format!("/api/documents/{}", doc.id)).await;
        assert!(document.starts_with("HTTP/1.1 200"), "{document}");
        assert!(document.contains("Over the wire"));

        let missing = get(addr, "/api/documents/4242").await;
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");
        assert!(missing.contains(r#""code":404"#));

        let locks = get(addr, &format!("/api/locks?document_id={}", doc.id)).await;
        assert!(locks.starts_with("HTTP/1.1 200"), "{locks}");
        assert!(locks.ends_with("[]"), "{locks}");
    }
}
