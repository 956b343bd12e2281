//! SQLite persistence for documents, versions, and block rows.
//!
//! Block rows are append-only. A version is a set of `(block row, position)`
//! links in `version_blocks`, so an unchanged block is shared by every version
//! that contains it and only its position may differ between them.

use std::path::Path;

use folio_types::{
    Block, BlockDraft, BlockRowId, BlockType, DocumentId, DocumentMeta, Timestamp, VersionId,
    VersionMeta, from_millis,
};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row, Transaction, params};

/// Database handle for document persistence.
pub struct DocumentDb {
    conn: Connection,
}

/// One entry of a version about to be committed.
#[derive(Debug, Clone)]
pub enum Slot {
    /// Link an existing row at `order`.
    Keep { row_id: BlockRowId, order: u32 },
    /// Insert a new row, then link it at `order`.
    Create { draft: BlockDraft, order: u32 },
}

impl Slot {
    pub fn order(&self) -> u32 {
        match self {
            Slot::Keep { order, .. } | Slot::Create { order, .. } => *order,
        }
    }
}

const SCHEMA: &str = r#"
-- Documents
CREATE TABLE IF NOT EXISTS documents (
    doc_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_modified INTEGER NOT NULL
);

-- Versions (append-only, immutable)
CREATE TABLE IF NOT EXISTS versions (
    version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id INTEGER NOT NULL REFERENCES documents(doc_id),
    changed_by TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_versions_doc ON versions(doc_id, version_id);

-- Block rows (append-only, immutable)
CREATE TABLE IF NOT EXISTS blocks (
    block_id INTEGER PRIMARY KEY AUTOINCREMENT,
    attribute_id TEXT NOT NULL,
    block_type TEXT NOT NULL,
    content TEXT NOT NULL,
    level INTEGER,
    style_classes TEXT NOT NULL DEFAULT '',
    alt_text TEXT NOT NULL DEFAULT '',
    parent_id TEXT,
    row_index INTEGER,
    col_index INTEGER
);
CREATE INDEX IF NOT EXISTS idx_blocks_attr ON blocks(attribute_id);

-- Version membership with per-version position
CREATE TABLE IF NOT EXISTS version_blocks (
    version_id INTEGER NOT NULL REFERENCES versions(version_id),
    block_id INTEGER NOT NULL REFERENCES blocks(block_id),
    position INTEGER NOT NULL,
    PRIMARY KEY (version_id, block_id),
    UNIQUE (version_id, position)
);
"#;

const BLOCK_COLUMNS: &str = "b.block_id, vb.position, b.attribute_id, b.block_type, b.content, \
     b.level, b.style_classes, b.alt_text, b.parent_id, b.row_index, b.col_index";

fn row_to_document(row: &Row<'_>) -> SqliteResult<DocumentMeta> {
    Ok(DocumentMeta {
        id: DocumentId::new(row.get(0)?),
        title: row.get(1)?,
        created_at: from_millis(row.get(2)?),
        last_modified: from_millis(row.get(3)?),
    })
}

fn row_to_version(row: &Row<'_>) -> SqliteResult<VersionMeta> {
    Ok(VersionMeta {
        id: VersionId::new(row.get(0)?),
        document_id: DocumentId::new(row.get(1)?),
        changed_by: row.get(2)?,
        created_at: from_millis(row.get(3)?),
    })
}

fn row_to_block(row: &Row<'_>) -> SqliteResult<Block> {
    let type_str: String = row.get(3)?;
    let block_type = BlockType::from_str(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown block type: {type_str}").into(),
        )
    })?;
    Ok(Block {
        row_id: BlockRowId::new(row.get(0)?),
        order: row.get(1)?,
        attribute_id: row.get(2)?,
        block_type,
        content: row.get(4)?,
        level: row.get(5)?,
        style_classes: row.get(6)?,
        alt_text: row.get(7)?,
        parent_id: row.get(8)?,
        row_index: row.get(9)?,
        col_index: row.get(10)?,
    })
}

fn insert_block(tx: &Transaction<'_>, draft: &BlockDraft) -> SqliteResult<BlockRowId> {
    tx.execute(
        "INSERT INTO blocks (attribute_id, block_type, content, level, style_classes, alt_text,
                             parent_id, row_index, col_index)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            draft.attribute_id,
            draft.block_type.as_str(),
            draft.content,
            draft.level,
            draft.style_classes,
            draft.alt_text,
            draft.parent_id,
            draft.row_index,
            draft.col_index,
        ],
    )?;
    Ok(BlockRowId::new(tx.last_insert_rowid()))
}

/// Insert a version row and link every slot to it.
fn insert_version(
    tx: &Transaction<'_>,
    doc_id: DocumentId,
    changed_by: &str,
    now: Timestamp,
    slots: &[Slot],
) -> SqliteResult<VersionMeta> {
    tx.execute(
        "INSERT INTO versions (doc_id, changed_by, created_at) VALUES (?1, ?2, ?3)",
        params![doc_id.get(), changed_by, now.timestamp_millis()],
    )?;
    let version_id = VersionId::new(tx.last_insert_rowid());

    let mut link = tx.prepare(
        "INSERT INTO version_blocks (version_id, block_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for slot in slots {
        let (row_id, order) = match slot {
            Slot::Keep { row_id, order } => (*row_id, *order),
            Slot::Create { draft, order } => (insert_block(tx, draft)?, *order),
        };
        link.execute(params![version_id.get(), row_id.get(), order])?;
    }

    tx.execute(
        "UPDATE documents SET last_modified = ?1 WHERE doc_id = ?2",
        params![now.timestamp_millis(), doc_id.get()],
    )?;

    Ok(VersionMeta {
        id: version_id,
        document_id: doc_id,
        changed_by: changed_by.to_string(),
        created_at: now,
    })
}

impl DocumentDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a document and its first version in one transaction.
    pub fn create_document(
        &self,
        title: &str,
        changed_by: &str,
        now: Timestamp,
        slots: &[Slot],
    ) -> SqliteResult<(DocumentMeta, VersionMeta)> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO documents (title, created_at, last_modified) VALUES (?1, ?2, ?2)",
            params![title, now.timestamp_millis()],
        )?;
        let doc_id = DocumentId::new(tx.last_insert_rowid());
        let version = insert_version(&tx, doc_id, changed_by, now, slots)?;
        tx.commit()?;

        let doc = DocumentMeta {
            id: doc_id,
            title: title.to_string(),
            created_at: now,
            last_modified: now,
        };
        Ok((doc, version))
    }

    /// Commit a new version of an existing document.
    ///
    /// Nothing is written unless every row and link is inserted.
    pub fn commit_version(
        &self,
        doc_id: DocumentId,
        changed_by: &str,
        now: Timestamp,
        slots: &[Slot],
    ) -> SqliteResult<VersionMeta> {
        let tx = self.conn.unchecked_transaction()?;
        let version = insert_version(&tx, doc_id, changed_by, now, slots)?;
        tx.commit()?;
        Ok(version)
    }

    /// Change a document's title. Returns false if the document is unknown.
    pub fn rename_document(
        &self,
        doc_id: DocumentId,
        title: &str,
        now: Timestamp,
    ) -> SqliteResult<bool> {
        let changed = self.conn.execute(
            "UPDATE documents SET title = ?1, last_modified = ?2 WHERE doc_id = ?3",
            params![title, now.timestamp_millis(), doc_id.get()],
        )?;
        Ok(changed > 0)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All documents, most recently modified first.
    pub fn list_documents(&self) -> SqliteResult<Vec<DocumentMeta>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, title, created_at, last_modified FROM documents
             ORDER BY last_modified DESC, doc_id DESC",
        )?;
        let rows = stmt.query_map([], row_to_document)?;
        rows.collect()
    }

    pub fn get_document(&self, doc_id: DocumentId) -> SqliteResult<Option<DocumentMeta>> {
        self.conn
            .query_row(
                "SELECT doc_id, title, created_at, last_modified FROM documents WHERE doc_id = ?1",
                params![doc_id.get()],
                row_to_document,
            )
            .optional()
    }

    /// Highest version id of a document.
    pub fn latest_version(&self, doc_id: DocumentId) -> SqliteResult<Option<VersionMeta>> {
        self.conn
            .query_row(
                "SELECT version_id, doc_id, changed_by, created_at FROM versions
                 WHERE doc_id = ?1 ORDER BY version_id DESC LIMIT 1",
                params![doc_id.get()],
                row_to_version,
            )
            .optional()
    }

    /// A version, only if it belongs to `doc_id`.
    pub fn get_version(
        &self,
        doc_id: DocumentId,
        version_id: VersionId,
    ) -> SqliteResult<Option<VersionMeta>> {
        self.conn
            .query_row(
                "SELECT version_id, doc_id, changed_by, created_at FROM versions
                 WHERE doc_id = ?1 AND version_id = ?2",
                params![doc_id.get(), version_id.get()],
                row_to_version,
            )
            .optional()
    }

    /// Version history, newest first.
    pub fn list_versions(&self, doc_id: DocumentId) -> SqliteResult<Vec<VersionMeta>> {
        let mut stmt = self.conn.prepare(
            "SELECT version_id, doc_id, changed_by, created_at FROM versions
             WHERE doc_id = ?1 ORDER BY version_id DESC",
        )?;
        let rows = stmt.query_map(params![doc_id.get()], row_to_version)?;
        rows.collect()
    }

    /// Blocks of a version in order.
    pub fn version_blocks(&self, version_id: VersionId) -> SqliteResult<Vec<Block>> {
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM version_blocks vb
             JOIN blocks b ON b.block_id = vb.block_id
             WHERE vb.version_id = ?1 ORDER BY vb.position"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![version_id.get()], row_to_block)?;
        rows.collect()
    }

    /// Total stored block rows across all versions.
    pub fn block_row_count(&self) -> SqliteResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
    }
}

// ============================================================================
// Tests
// ============================================================================
