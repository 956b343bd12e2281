//! Versioned document storage with copy-on-write mutation.
//!
//! Every mutation reads the latest version, derives the next block set as a
//! [`Layout`], validates it, and commits it as a new version in one
//! transaction. Unchanged blocks are shared with the previous version.
//!
//! # Concurrency Model
//!
//! - One SQLite connection behind a `parking_lot::Mutex`
//! - The mutex is held from reading the latest version through the commit, so
//!   two mutations of a document never derive from the same base

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use folio_types::{
    Block, BlockMetadata, BlockRowId, BlockType, DocumentId, DocumentMeta, InsertKind,
    TemplateItem, VersionId, VersionMeta,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::db::DocumentDb;
use crate::error::{StoreError, StoreResult};
use crate::layout::Layout;
use crate::render::render;
use crate::table::{TableView, to_template};
use crate::templates::{MemoryTemplateStore, TemplateStore};

/// Latest state of a document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub document: DocumentMeta,
    pub version: VersionMeta,
    pub blocks: Vec<Block>,
    pub content_html: String,
}

/// One historical version of a document.
#[derive(Debug, Clone, Serialize)]
pub struct VersionView {
    pub title: String,
    pub version: VersionMeta,
    pub blocks: Vec<Block>,
    pub content_html: String,
}

/// Result of editing one block.
#[derive(Debug, Clone)]
pub struct BlockUpdate {
    pub version: VersionMeta,
    pub block: Block,
}

/// Result of inserting a block or table.
#[derive(Debug, Clone)]
pub struct Insertion {
    pub version: VersionMeta,
    /// New blocks in order; a table yields its options block then its cells.
    pub added: Vec<Block>,
}

/// Result of deleting a block.
#[derive(Debug, Clone)]
pub struct Removal {
    pub version: VersionMeta,
    pub removed: Vec<String>,
}

/// Result of adding a table row.
#[derive(Debug, Clone)]
pub struct RowInsertion {
    pub version: VersionMeta,
    pub row_index: u32,
    pub cells: Vec<Block>,
}

/// Document storage: versioned blocks plus templates.
pub struct DocumentStore {
    db: Mutex<DocumentDb>,
    templates: Arc<dyn TemplateStore>,
}

/// Thread-safe shared store handle.
pub type SharedDocumentStore = Arc<DocumentStore>;

/// Blocks whose attribute id is in `attrs`, in order.
fn pick(blocks: Vec<Block>, attrs: &[String]) -> Vec<Block> {
    blocks
        .into_iter()
        .filter(|b| attrs.contains(&b.attribute_id))
        .collect()
}

impl DocumentStore {
    pub fn new(db: DocumentDb, templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            db: Mutex::new(db),
            templates,
        }
    }

    /// In-memory database with the starter template (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(
            DocumentDb::in_memory()?,
            Arc::new(MemoryTemplateStore::with_default()),
        ))
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    fn latest(db: &DocumentDb, doc: DocumentId) -> StoreResult<(DocumentMeta, VersionMeta, Vec<Block>)> {
        let document = db
            .get_document(doc)?
            .ok_or(StoreError::DocumentNotFound(doc))?;
        let version = db.latest_version(doc)?.ok_or(StoreError::NoVersions(doc))?;
        let blocks = db.version_blocks(version.id)?;
        Ok((document, version, blocks))
    }

    /// Derive and commit the next version of `doc` through `edit`.
    fn derive<T>(
        &self,
        doc: DocumentId,
        changed_by: &str,
        edit: impl FnOnce(&mut Layout) -> StoreResult<T>,
    ) -> StoreResult<(VersionMeta, Vec<Block>, T)> {
        let db = self.db.lock();
        let (_, base, blocks) = Self::latest(&db, doc)?;
        let mut layout = Layout::from_blocks(blocks);
        let out = edit(&mut layout)?;
        layout.validate()?;

        let version = db
            .commit_version(doc, changed_by, folio_types::now(), &layout.into_slots())
            .inspect_err(|e| tracing::error!(document = %doc, "commit failed, rolled back: {e}"))?;
        tracing::info!(
            document = %doc,
            base = %base.id,
            version = %version.id,
            changed_by,
            "committed version"
        );
        let blocks = db.version_blocks(version.id)?;
        Ok((version, blocks, out))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a document whose first version is built from template `template`.
    pub fn create_from_template(
        &self,
        title: &str,
        template: &str,
        changed_by: &str,
    ) -> StoreResult<(DocumentMeta, VersionMeta)> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::validation("title must not be empty"));
        }
        let items = self
            .templates
            .get(template)?
            .ok_or_else(|| StoreError::TemplateNotFound(template.to_string()))?;

        let layout = Layout::from_template(&items);
        layout.validate()?;

        let db = self.db.lock();
        let (doc, version) =
            db.create_document(title, changed_by, folio_types::now(), &layout.into_slots())?;
        tracing::info!(document = %doc.id, template, changed_by, "created document");
        Ok((doc, version))
    }

    /// Store a new revision of block `attribute_id` with `content` and the
    /// overrides in `meta`.
    pub fn update_block(
        &self,
        doc: DocumentId,
        attribute_id: &str,
        content: &str,
        meta: &BlockMetadata,
        changed_by: &str,
    ) -> StoreResult<BlockUpdate> {
        let (version, blocks, _) =
            self.derive(doc, changed_by, |layout| layout.update(attribute_id, content, meta))?;
        let block = blocks
            .into_iter()
            .find(|b| b.attribute_id == attribute_id)
            .ok_or_else(|| StoreError::BlockNotFound(attribute_id.to_string()))?;
        Ok(BlockUpdate { version, block })
    }

    /// Insert a block, or a default table, after `after` (or at the end).
    pub fn add_block(
        &self,
        doc: DocumentId,
        kind: InsertKind,
        after: Option<&str>,
        changed_by: &str,
    ) -> StoreResult<Insertion> {
        let (version, blocks, added) =
            self.derive(doc, changed_by, |layout| Ok(layout.insert(kind, after)))?;
        Ok(Insertion {
            version,
            added: pick(blocks, &added),
        })
    }

    /// Delete a block; see [`Layout::remove`] for what cascades.
    pub fn delete_block(
        &self,
        doc: DocumentId,
        attribute_id: &str,
        changed_by: &str,
    ) -> StoreResult<Removal> {
        let (version, _, removed) =
            self.derive(doc, changed_by, |layout| layout.remove(attribute_id))?;
        Ok(Removal { version, removed })
    }

    /// Attribute ids a [`delete_block`](Self::delete_block) would remove now.
    pub fn removal_preview(&self, doc: DocumentId, attribute_id: &str) -> StoreResult<Vec<String>> {
        let db = self.db.lock();
        let (_, _, blocks) = Self::latest(&db, doc)?;
        Layout::from_blocks(blocks).remove(attribute_id)
    }

    /// Add a row of empty cells to table `table_id`.
    pub fn add_table_row(
        &self,
        doc: DocumentId,
        table_id: &str,
        after_row: Option<u32>,
        changed_by: &str,
    ) -> StoreResult<RowInsertion> {
        let (version, blocks, (row_index, added)) =
            self.derive(doc, changed_by, |layout| layout.add_table_row(table_id, after_row))?;
        Ok(RowInsertion {
            version,
            row_index,
            cells: pick(blocks, &added),
        })
    }

    /// Replace the options of table `table_id`. `options_json` must be a JSON
    /// object.
    pub fn update_table_options(
        &self,
        doc: DocumentId,
        table_id: &str,
        options_json: &str,
        changed_by: &str,
    ) -> StoreResult<BlockUpdate> {
        match serde_json::from_str::<serde_json::Value>(options_json) {
            Ok(value) if value.is_object() => {}
            Ok(_) => return Err(StoreError::validation("table options must be a JSON object")),
            Err(e) => return Err(StoreError::validation(format!("invalid table options: {e}"))),
        }
        let meta = BlockMetadata {
            block_type: Some(BlockType::TableOptions),
            parent_block_id: Some(Some(table_id.to_string())),
            ..Default::default()
        };

        let (version, blocks, attr) = self.derive(doc, changed_by, |layout| {
            let attr = layout
                .options_of(table_id)
                .ok_or_else(|| StoreError::TableOptionsNotFound(table_id.to_string()))?
                .to_string();
            layout.update(&attr, options_json, &meta)?;
            Ok(attr)
        })?;
        let block = blocks
            .into_iter()
            .find(|b| b.attribute_id == attr)
            .ok_or(StoreError::TableOptionsNotFound(table_id.to_string()))?;
        Ok(BlockUpdate { version, block })
    }

    /// New version with exactly the blocks of `target`, at the same orders.
    pub fn revert(
        &self,
        doc: DocumentId,
        target: VersionId,
        changed_by: &str,
    ) -> StoreResult<VersionMeta> {
        let db = self.db.lock();
        if db.get_document(doc)?.is_none() {
            return Err(StoreError::DocumentNotFound(doc));
        }
        if db.get_version(doc, target)?.is_none() {
            return Err(StoreError::VersionNotFound {
                document: doc,
                version: target,
            });
        }
        let layout = Layout::from_blocks(db.version_blocks(target)?);
        layout.validate()?;

        let label = VersionMeta::revert_label(changed_by, target);
        let version = db.commit_version(doc, &label, folio_types::now(), &layout.into_slots())?;
        tracing::info!(document = %doc, target = %target, version = %version.id, "reverted");
        Ok(version)
    }

    /// Attribute ids whose block a [`revert`](Self::revert) to `target` would
    /// replace or drop.
    pub fn revert_preview(&self, doc: DocumentId, target: VersionId) -> StoreResult<Vec<String>> {
        let db = self.db.lock();
        let (_, _, current) = Self::latest(&db, doc)?;
        if db.get_version(doc, target)?.is_none() {
            return Err(StoreError::VersionNotFound {
                document: doc,
                version: target,
            });
        }
        let restored = db.version_blocks(target)?;

        let rows: HashMap<&str, BlockRowId> = current
            .iter()
            .map(|b| (b.attribute_id.as_str(), b.row_id))
            .collect();
        let kept: HashSet<&str> = restored.iter().map(|b| b.attribute_id.as_str()).collect();
        let mut changed: Vec<String> = restored
            .iter()
            .filter(|b| rows.get(b.attribute_id.as_str()) != Some(&b.row_id))
            .map(|b| b.attribute_id.clone())
            .collect();
        changed.extend(
            current
                .iter()
                .filter(|b| !kept.contains(b.attribute_id.as_str()))
                .map(|b| b.attribute_id.clone()),
        );
        Ok(changed)
    }

    /// Change a document's title.
    pub fn rename_document(&self, doc: DocumentId, title: &str) -> StoreResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::validation("title must not be empty"));
        }
        if !self.db.lock().rename_document(doc, title, folio_types::now())? {
            return Err(StoreError::DocumentNotFound(doc));
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All documents, most recently modified first.
    pub fn list_documents(&self) -> StoreResult<Vec<DocumentMeta>> {
        Ok(self.db.lock().list_documents()?)
    }

    /// Latest version of a document, rendered.
    pub fn document(&self, doc: DocumentId) -> StoreResult<DocumentView> {
        let (document, version, blocks) = Self::latest(&self.db.lock(), doc)?;
        let content_html = render(&blocks);
        Ok(DocumentView {
            document,
            version,
            blocks,
            content_html,
        })
    }

    /// Blocks of the latest version, in order.
    pub fn latest_blocks(&self, doc: DocumentId) -> StoreResult<Vec<Block>> {
        let (_, _, blocks) = Self::latest(&self.db.lock(), doc)?;
        Ok(blocks)
    }

    /// Version history, newest first.
    pub fn versions(&self, doc: DocumentId) -> StoreResult<Vec<VersionMeta>> {
        let db = self.db.lock();
        if db.get_document(doc)?.is_none() {
            return Err(StoreError::DocumentNotFound(doc));
        }
        Ok(db.list_versions(doc)?)
    }

    /// A specific version, rendered.
    pub fn version(&self, doc: DocumentId, version: VersionId) -> StoreResult<VersionView> {
        let db = self.db.lock();
        let document = db
            .get_document(doc)?
            .ok_or(StoreError::DocumentNotFound(doc))?;
        let meta = db
            .get_version(doc, version)?
            .ok_or(StoreError::VersionNotFound {
                document: doc,
                version,
            })?;
        let blocks = db.version_blocks(version)?;
        let content_html = render(&blocks);
        Ok(VersionView {
            title: document.title,
            version: meta,
            blocks,
            content_html,
        })
    }

    /// Cells of table `table_id` in the latest version as plain text rows.
    ///
    /// A table that exists but has no cells yields an empty grid.
    pub fn table_content(&self, doc: DocumentId, table_id: &str) -> StoreResult<Vec<Vec<String>>> {
        let blocks = self.latest_blocks(doc)?;
        let view = TableView::collect(&blocks, table_id)
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;
        Ok(view.plain_grid())
    }

    /// Save the latest structure of `doc` as template `name`. Returns the
    /// stored (sanitized) name.
    pub fn save_as_template(&self, doc: DocumentId, name: &str) -> StoreResult<String> {
        let items: Vec<TemplateItem> = to_template(&self.latest_blocks(doc)?);
        self.templates.save(name, &items)
    }

    pub fn list_templates(&self) -> StoreResult<Vec<String>> {
        self.templates.list()
    }

    /// Total stored block rows.
    pub fn block_row_count(&self) -> StoreResult<i64> {
        Ok(self.db.lock().block_row_count()?)
    }
}

/// Create a shared store over `db` and `templates`.
pub fn shared_document_store(
    db: DocumentDb,
    templates: Arc<dyn TemplateStore>,
) -> SharedDocumentStore {
    Arc::new(DocumentStore::new(db, templates))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::{SimpleItem, TableItem};

    fn store_with(items: Vec<TemplateItem>) -> DocumentStore {
        let store = DocumentStore::in_memory().unwrap();
        store.templates().save("t", &items).unwrap();
        store
    }

    fn heading_only() -> DocumentStore {
        store_with(vec![TemplateItem::Heading(SimpleItem {
            content: "Title".into(),
            level: Some(1),
            ..Default::default()
        })])
    }

    fn orders(blocks: &[Block]) -> Vec<u32> {
        blocks.iter().map(|b| b.order).collect()
    }

    #[test]
    fn test_create_from_template() {
        let store = DocumentStore::in_memory().unwrap();
        let (doc, version) = store.create_from_template("Doc", "default", "alice").unwrap();
        assert_eq!(version.changed_by, "alice");

        let view = store.document(doc.id).unwrap();
        assert_eq!(view.document.title, "Doc");
        assert_eq!(orders(&view.blocks), (0..view.blocks.len() as u32).collect::<Vec<_>>());
        assert!(view.content_html.contains("<h1 "));
        assert!(view.content_html.contains("<table "));
    }

    #[test]
    fn test_create_unknown_template() {
        let store = DocumentStore::in_memory().unwrap();
        let err = store.create_from_template("Doc", "nope", "alice").unwrap_err();
        assert!(matches!(err, StoreError::TemplateNotFound(_)));
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_blank_title() {
        let store = DocumentStore::in_memory().unwrap();
        let err = store.create_from_template("  ", "default", "alice").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_update_block_same_attribute_id() {
        let store = heading_only();
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        let heading = store.latest_blocks(doc.id).unwrap().remove(0);

        let update = store
            .update_block(doc.id, &heading.attribute_id, "New", &BlockMetadata::default(), "bob")
            .unwrap();
        assert_eq!(update.block.attribute_id, heading.attribute_id);
        assert_ne!(update.block.row_id, heading.row_id);
        assert_eq!(update.block.content, "New");
        assert_eq!(update.block.level, Some(1));
        assert_eq!(update.version.changed_by, "bob");
    }

    #[test]
    fn test_update_null_level_clears_it() {
        let store = heading_only();
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        let heading = store.latest_blocks(doc.id).unwrap().remove(0);
        let meta: BlockMetadata = serde_json::from_str(r#"{"level": null}"#).unwrap();

        let update = store
            .update_block(doc.id, &heading.attribute_id, "Plain", &meta, "bob")
            .unwrap();
        assert_eq!(update.block.level, None);
        assert_eq!(store.latest_blocks(doc.id).unwrap()[0].level, None);
    }

    #[test]
    fn test_update_missing_block_creates_no_version() {
        let store = heading_only();
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        let err = store
            .update_block(doc.id, "missing", "x", &BlockMetadata::default(), "bob")
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.versions(doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_update_table_options() {
        let store = store_with(vec![TemplateItem::Table(TableItem {
            options: Some(serde_json::json!({"columns": ["1px"]})),
            rows: vec![vec!["a".into()]],
            ..Default::default()
        })]);
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        let table_id = store.latest_blocks(doc.id).unwrap()[0].parent_id.clone().unwrap();

        let update = store
            .update_table_options(doc.id, &table_id, r#"{"columns":["9px"]}"#, "bob")
            .unwrap();
        assert_eq!(update.block.block_type, BlockType::TableOptions);
        assert!(store.document(doc.id).unwrap().content_html.contains("width: 9px;"));

        let err = store.update_table_options(doc.id, &table_id, "[1]", "bob").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = store.update_table_options(doc.id, "other", "{}", "bob").unwrap_err();
        assert!(matches!(err, StoreError::TableOptionsNotFound(_)));
    }

    #[test]
    fn test_revert_unknown_version() {
        let store = heading_only();
        let (a, _) = store.create_from_template("A", "t", "alice").unwrap();
        let (_, vb) = store.create_from_template("B", "t", "alice").unwrap();
        let err = store.revert(a.id, vb.id, "alice").unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound { .. }));
    }

    #[test]
    fn test_revert_preview_lists_changed_blocks() {
        let store = heading_only();
        let (doc, v1) = store.create_from_template("Doc", "t", "alice").unwrap();
        let heading = store.latest_blocks(doc.id).unwrap()[0].attribute_id.clone();
        assert!(store.revert_preview(doc.id, v1.id).unwrap().is_empty());

        store
            .update_block(doc.id, &heading, "Renamed", &BlockMetadata::default(), "bob")
            .unwrap();
        let added = store.add_block(doc.id, InsertKind::Text, None, "bob").unwrap();
        let mut changed = store.revert_preview(doc.id, v1.id).unwrap();
        changed.sort();
        let mut expected = vec![heading, added.added[0].attribute_id.clone()];
        expected.sort();
        assert_eq!(changed, expected);
    }

    #[test]
    fn test_table_content() {
        let store = store_with(vec![TemplateItem::Table(TableItem {
            rows: vec![vec!["<i>x</i>".into(), "y".into()]],
            ..Default::default()
        })]);
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        let table_id = store.latest_blocks(doc.id).unwrap()[0].parent_id.clone().unwrap();

        assert_eq!(
            store.table_content(doc.id, &table_id).unwrap(),
            vec![vec!["x".to_string(), "y".to_string()]]
        );
        assert!(matches!(
            store.table_content(doc.id, "nope"),
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_table_content_options_only() {
        let store = store_with(vec![TemplateItem::Table(TableItem {
            options: Some(serde_json::json!({})),
            ..Default::default()
        })]);
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        let table_id = store.latest_blocks(doc.id).unwrap()[0].parent_id.clone().unwrap();
        assert!(store.table_content(doc.id, &table_id).unwrap().is_empty());
    }

    #[test]
    fn test_rename_document() {
        let store = heading_only();
        let (doc, _) = store.create_from_template("Doc", "t", "alice").unwrap();
        store.rename_document(doc.id, "Renamed").unwrap();
        assert_eq!(store.document(doc.id).unwrap().document.title, "Renamed");
        assert!(store.rename_document(DocumentId::new(404), "x").is_err());
    }

    #[test]
    fn test_reads_on_missing_document() {
        let store = DocumentStore::in_memory().unwrap();
        let missing = DocumentId::new(1);
        assert!(matches!(store.document(missing), Err(StoreError::DocumentNotFound(_))));
        assert!(matches!(store.versions(missing), Err(StoreError::DocumentNotFound(_))));
        assert!(store.save_as_template(missing, "x").unwrap_err().is_not_found());
    }
}
