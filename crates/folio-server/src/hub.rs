//! The coordination hub: sessions, locks, and message dispatch.
//!
//! One [`Hub`] is built at startup and shared by every connection. Session
//! and lock state sit behind a single async mutex that is held for the whole
//! handling of one message, so messages from all connections are processed
//! one at a time. Broadcasts only enqueue onto per-session channels and never
//! wait on a socket.

use folio_kernel::{Insertion, Removal, RowInsertion, SharedDocumentStore};
use folio_types::{BlockType, DocumentId, InsertKind, Session, SessionId, VersionId, VersionMeta};
use tokio::sync::Mutex;

use crate::error::DispatchError;
use crate::locks::{Acquire, LockInfo, LockKey, LockTable, Release};
use crate::protocol::{
    BlockRef, ClientMessage, ServerMessage, SetUsername, UpdateDocument, UpdateTableOptions,
};
use crate::sessions::{Outbox, SessionRegistry};

#[derive(Debug, Default)]
struct HubState {
    sessions: SessionRegistry,
    locks: LockTable,
}

pub struct Hub {
    store: SharedDocumentStore,
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new(store: SharedDocumentStore) -> Self {
        Self {
            store,
            state: Mutex::new(HubState::default()),
        }
    }

    pub fn store(&self) -> &SharedDocumentStore {
        &self.store
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Register a session and queue its `session_ack`.
    pub async fn connect(&self, outbox: Outbox) -> Session {
        let mut state = self.state.lock().await;
        let session = state.sessions.register(outbox);
        state.sessions.send_to(
            session.id,
            ServerMessage::SessionAck {
                session_id: session.id,
                username: session.username.clone(),
            },
        );
        tracing::info!(
            session = %session.id.short(),
            username = %session.username,
            "session connected"
        );
        session
    }

    /// Remove a session and release every lock it held.
    pub async fn disconnect(&self, session: SessionId) {
        let mut state = self.state.lock().await;
        let Some(gone) = state.sessions.deregister(session) else {
            return;
        };
        let released = state.locks.release_all(session);
        for (key, holder) in &released {
            state.sessions.broadcast(&unlocked(key, &holder.username), None);
        }
        tracing::info!(
            session = %session.short(),
            username = %gone.username,
            locks_released = released.len(),
            "session disconnected"
        );
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Decode and handle one text frame. Decode failures are answered with an
    /// `error` reply.
    pub async fn handle_text(&self, session: SessionId, text: &str) {
        match ClientMessage::parse(text) {
            Ok(msg) => self.handle(session, msg).await,
            Err(err) => {
                tracing::warn!(session = %session.short(), error = %err, "rejected frame");
                self.state.lock().await.sessions.send_to(session, err.to_message());
            }
        }
    }

    /// Handle one message to completion.
    pub async fn handle(&self, session: SessionId, msg: ClientMessage) {
        let mut state = self.state.lock().await;
        tracing::debug!(session = %session.short(), kind = msg.kind(), "handling message");
        if let Err(err) = self.dispatch(&mut state, session, msg) {
            tracing::warn!(
                session = %session.short(),
                code = err.code(),
                error = %err,
                "request refused"
            );
            state.sessions.send_to(session, err.to_message());
        }
    }

    fn dispatch(
        &self,
        state: &mut HubState,
        session: SessionId,
        msg: ClientMessage,
    ) -> Result<(), DispatchError> {
        let username = state
            .sessions
            .username(session)
            .ok_or_else(|| DispatchError::Protocol("session is not registered".into()))?
            .to_string();

        match msg {
            ClientMessage::SetUsername(req) => state.set_username(session, req),
            ClientMessage::Heartbeat {} => {
                state.sessions.send_to(
                    session,
                    ServerMessage::HeartbeatAck {
                        server_time: folio_types::now(),
                    },
                );
                Ok(())
            }
            ClientMessage::LockBlock(req) => {
                let key = block_key(&req)?;
                if state.acquire(session, &username, key.clone()) == Acquire::AlreadyHeld {
                    state.sessions.send_to(session, locked(&key, &username));
                }
                Ok(())
            }
            ClientMessage::UnlockBlock(req) => state.unlock(session, &username, block_key(&req)?),
            ClientMessage::UpdateDocument(req) => self.update_document(state, session, &username, req),
            ClientMessage::UpdateTableOptions(req) => {
                self.update_table_options(state, session, &username, req)
            }
        }
    }

    /// Lock, edit, and announce one block.
    ///
    /// If this message took the lock and the edit fails, the lock is given
    /// back before the error reply.
    fn update_document(
        &self,
        state: &mut HubState,
        session: SessionId,
        username: &str,
        req: UpdateDocument,
    ) -> Result<(), DispatchError> {
        let key = require_block_id(req.document_id, &req.block_id)?;
        let acquired = match state.acquire(session, username, key.clone()) {
            Acquire::Denied { .. } => return Ok(()),
            Acquire::Granted => true,
            Acquire::AlreadyHeld => false,
        };

        let update = match self.store.update_block(
            req.document_id,
            &req.block_id,
            &req.content,
            &req.metadata,
            username,
        ) {
            Ok(update) => update,
            Err(err) => {
                if acquired {
                    state.locks.release(&key, session);
                    state.sessions.broadcast(&unlocked(&key, username), None);
                }
                return Err(err.into());
            }
        };

        state.sessions.broadcast(
            &ServerMessage::DocumentUpdated {
                document_id: req.document_id,
                version_id: update.version.id,
                block_id: req.block_id,
                content_html: update.block.content,
                metadata: req.metadata,
                timestamp: update.version.created_at,
            },
            Some(session),
        );
        Ok(())
    }

    fn update_table_options(
        &self,
        state: &mut HubState,
        session: SessionId,
        username: &str,
        req: UpdateTableOptions,
    ) -> Result<(), DispatchError> {
        if req.table_id.trim().is_empty() {
            return Err(DispatchError::validation("table_id must not be empty"));
        }
        let options_blocks: Vec<String> = self
            .store
            .latest_blocks(req.document_id)?
            .into_iter()
            .filter(|b| b.block_type == BlockType::TableOptions && b.belongs_to_table(&req.table_id))
            .map(|b| b.attribute_id)
            .collect();
        if let Some(holder) =
            state
                .locks
                .first_held_by_other(req.document_id, &options_blocks, Some(session))
        {
            return Err(DispatchError::locked_by(&holder.username));
        }

        self.store.update_table_options(
            req.document_id,
            &req.table_id,
            &req.options_json.to_json_string(),
            username,
        )?;
        state.sessions.broadcast(
            &ServerMessage::TableOptionsUpdated {
                document_id: req.document_id,
                table_id: req.table_id,
                options_json: req.options_json,
            },
            Some(session),
        );
        Ok(())
    }

    // =========================================================================
    // Mutations from the HTTP surface
    // =========================================================================
    //
    // These hold the hub state for their whole span so lock checks and the
    // commit see the same lock table. Each new version is announced to every
    // session as `version_created`.

    pub async fn add_block(
        &self,
        doc: DocumentId,
        kind: InsertKind,
        after: Option<&str>,
        author: &str,
    ) -> Result<Insertion, DispatchError> {
        let state = self.state.lock().await;
        let insertion = self.store.add_block(doc, kind, after, author)?;
        state.announce(&insertion.version);
        Ok(insertion)
    }

    /// Delete a block, refusing if any block it would remove is locked.
    pub async fn delete_block(
        &self,
        doc: DocumentId,
        block_id: &str,
        author: &str,
    ) -> Result<Removal, DispatchError> {
        let state = self.state.lock().await;
        let doomed = self.store.removal_preview(doc, block_id)?;
        if let Some(holder) = state.locks.first_held_by_other(doc, &doomed, None) {
            return Err(DispatchError::locked_by(&holder.username));
        }
        let removal = self.store.delete_block(doc, block_id, author)?;
        state.announce(&removal.version);
        Ok(removal)
    }

    pub async fn add_table_row(
        &self,
        doc: DocumentId,
        table_id: &str,
        after_row: Option<u32>,
        author: &str,
    ) -> Result<RowInsertion, DispatchError> {
        let state = self.state.lock().await;
        let insertion = self.store.add_table_row(doc, table_id, after_row, author)?;
        state.announce(&insertion.version);
        Ok(insertion)
    }

    /// Revert to `target`, refusing if any block it would replace or drop is
    /// locked.
    pub async fn revert(
        &self,
        doc: DocumentId,
        target: VersionId,
        author: &str,
    ) -> Result<VersionMeta, DispatchError> {
        let state = self.state.lock().await;
        let changed = self.store.revert_preview(doc, target)?;
        if let Some(holder) = state.locks.first_held_by_other(doc, &changed, None) {
            return Err(DispatchError::locked_by(&holder.username));
        }
        let version = self.store.revert(doc, target, author)?;
        state.announce(&version);
        Ok(version)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn locks(&self, doc: DocumentId) -> Vec<LockInfo> {
        self.state.lock().await.locks.locks_for(doc)
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

impl HubState {
    /// Take a lock, broadcasting `block_locked` on success and replying
    /// `lock_denied` to the caller on contention.
    fn acquire(&mut self, session: SessionId, username: &str, key: LockKey) -> Acquire {
        let outcome = self.locks.acquire(key.clone(), session, username);
        match &outcome {
            Acquire::Granted => {
                tracing::info!(
                    document = %key.document_id,
                    block = %key.block_id,
                    username,
                    "lock granted"
                );
                self.sessions.broadcast(&locked(&key, username), None);
            }
            Acquire::AlreadyHeld => {}
            Acquire::Denied { holder } => {
                tracing::debug!(block = %key.block_id, holder = %holder, username, "lock denied");
                self.sessions.send_to(
                    session,
                    ServerMessage::LockDenied {
                        document_id: key.document_id,
                        block_id: key.block_id,
                        locked_by: holder.clone(),
                        timestamp: folio_types::now(),
                    },
                );
            }
        }
        outcome
    }

    fn unlock(
        &mut self,
        session: SessionId,
        username: &str,
        key: LockKey,
    ) -> Result<(), DispatchError> {
        match self.locks.release(&key, session) {
            Release::Released => {
                self.sessions.broadcast(&unlocked(&key, username), None);
                Ok(())
            }
            Release::NotHolder { holder } => Err(DispatchError::Conflict(format!(
                "cannot unlock block locked by {holder}"
            ))),
            Release::NotLocked => {
                tracing::debug!(block = %key.block_id, "unlock of unlocked block ignored");
                Ok(())
            }
        }
    }

    /// Rename the session and every lock it holds, re-announcing those locks
    /// under the new name.
    fn set_username(&mut self, session: SessionId, req: SetUsername) -> Result<(), DispatchError> {
        let username = req.username.trim();
        if username.is_empty() {
            return Err(DispatchError::validation("username must not be empty"));
        }
        self.sessions.set_username(session, username);
        for key in self.locks.rename_holder(session, username) {
            self.sessions.broadcast(&locked(&key, username), None);
        }
        self.sessions.send_to(
            session,
            ServerMessage::SessionAck {
                session_id: session,
                username: username.to_string(),
            },
        );
        Ok(())
    }

    fn announce(&self, version: &VersionMeta) {
        self.sessions.broadcast(
            &ServerMessage::VersionCreated {
                document_id: version.document_id,
                version_id: version.id,
                changed_by: version.changed_by.clone(),
                timestamp: version.created_at,
            },
            None,
        );
    }
}

fn block_key(req: &BlockRef) -> Result<LockKey, DispatchError> {
    require_block_id(req.document_id, &req.block_id)
}

fn require_block_id(document_id: DocumentId, block_id: &str) -> Result<LockKey, DispatchError> {
    if block_id.trim().is_empty() {
        return Err(DispatchError::validation("block_id must not be empty"));
    }
    Ok(LockKey::new(document_id, block_id))
}

fn locked(key: &LockKey, username: &str) -> ServerMessage {
    ServerMessage::BlockLocked {
        document_id: key.document_id,
        block_id: key.block_id.clone(),
        locked_by: username.to_string(),
        timestamp: folio_types::now(),
    }
}

fn unlocked(key: &LockKey, username: &str) -> ServerMessage {
    ServerMessage::BlockUnlocked {
        document_id: key.document_id,
        block_id: key.block_id.clone(),
        unlocked_by: username.to_string(),
        timestamp: folio_types::now(),
    }
}
