//! Advisory per-block edit locks.
//!
//! A lock is keyed by (document, block attribute id) and names the session
//! that holds it. Locks never expire; they go away when the holder releases
//! them or disconnects.

use std::collections::HashMap;

use folio_types::{DocumentId, SessionId, Timestamp};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub document_id: DocumentId,
    pub block_id: String,
}

impl LockKey {
    pub fn new(document_id: DocumentId, block_id: impl Into<String>) -> Self {
        Self {
            document_id,
            block_id: block_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockHolder {
    pub session: SessionId,
    pub username: String,
    pub acquired_at: Timestamp,
}

/// Outcome of [`LockTable::acquire`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// Newly taken by the caller.
    Granted,
    /// The caller already held it.
    AlreadyHeld,
    /// Held by someone else.
    Denied { holder: String },
}

/// Outcome of [`LockTable::release`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Release {
    Released,
    NotHolder { holder: String },
    NotLocked,
}

/// One row of a lock listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    pub block_id: String,
    pub locked_by: String,
}

#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<LockKey, LockHolder>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, key: LockKey, session: SessionId, username: &str) -> Acquire {
        match self.locks.get(&key) {
            Some(holder) if holder.session == session => Acquire::AlreadyHeld,
            Some(holder) => Acquire::Denied {
                holder: holder.username.clone(),
            },
            None => {
                self.locks.insert(
                    key,
                    LockHolder {
                        session,
                        username: username.to_string(),
                        acquired_at: folio_types::now(),
                    },
                );
                Acquire::Granted
            }
        }
    }

    pub fn release(&mut self, key: &LockKey, session: SessionId) -> Release {
        match self.locks.get(key) {
            None => Release::NotLocked,
            Some(holder) if holder.session != session => Release::NotHolder {
                holder: holder.username.clone(),
            },
            Some(_) => {
                self.locks.remove(key);
                Release::Released
            }
        }
    }

    /// Drop every lock held by `session`, returning them sorted by key.
    pub fn release_all(&mut self, session: SessionId) -> Vec<(LockKey, LockHolder)> {
        let keys: Vec<LockKey> = self
            .locks
            .iter()
            .filter(|(_, holder)| holder.session == session)
            .map(|(key, _)| key.clone())
            .collect();
        let mut released: Vec<(LockKey, LockHolder)> = keys
            .into_iter()
            .filter_map(|key| self.locks.remove_entry(&key))
            .collect();
        released.sort_by(|a, b| a.0.cmp(&b.0));
        released
    }

    /// Update the display name on every lock `session` holds. Returns the
    /// renamed keys, sorted.
    pub fn rename_holder(&mut self, session: SessionId, username: &str) -> Vec<LockKey> {
        let mut renamed = Vec::new();
        for (key, holder) in self.locks.iter_mut().filter(|(_, h)| h.session == session) {
            holder.username = username.to_string();
            renamed.push(key.clone());
        }
        renamed.sort();
        renamed
    }

    /// First of `blocks` locked by a session other than `session`.
    ///
    /// With `session = None` any lock counts.
    pub fn first_held_by_other<'a>(
        &'a self,
        document_id: DocumentId,
        blocks: &[String],
        session: Option<SessionId>,
    ) -> Option<&'a LockHolder> {
        blocks.iter().find_map(|block| {
            self.locks
                .get(&LockKey::new(document_id, block.as_str()))
                .filter(|holder| Some(holder.session) != session)
        })
    }

    /// Locks on `document_id`, sorted by block id.
    pub fn locks_for(&self, document_id: DocumentId) -> Vec<LockInfo> {
        let mut locks: Vec<LockInfo> = self
            .locks
            .iter()
            .filter(|(key, _)| key.document_id == document_id)
            .map(|(key, holder)| LockInfo {
                block_id: key.block_id.clone(),
                locked_by: holder.username.clone(),
            })
            .collect();
        locks.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        locks
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
