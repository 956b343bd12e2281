//! Pure planning of the next version's block set.
//!
//! A [`Layout`] is the ordered block list of a version being derived. Each
//! entry either keeps an existing row or creates a new one; an entry's order
//! is its index, so every layout is dense by construction. Mutations edit the
//! layout, [`Layout::validate`] checks table structure, and
//! [`Layout::into_slots`] hands the result to storage.

use std::collections::{HashMap, HashSet};

use folio_types::{
    Block, BlockDraft, BlockMetadata, BlockType, DEFAULT_TABLE_COLS, DEFAULT_TABLE_ROWS,
    InsertKind, TemplateItem, default_table_options, new_attribute_id, options_attribute_id,
};

use crate::db::Slot;
use crate::error::{StoreError, StoreResult};

/// One position in a layout.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Existing row, shared with the base version.
    Keep(Block),
    /// New row to insert.
    Create(BlockDraft),
}

impl Entry {
    pub fn attribute_id(&self) -> &str {
        match self {
            Entry::Keep(b) => &b.attribute_id,
            Entry::Create(d) => &d.attribute_id,
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Entry::Keep(b) => b.block_type,
            Entry::Create(d) => d.block_type,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Entry::Keep(b) => b.parent_id.as_deref(),
            Entry::Create(d) => d.parent_id.as_deref(),
        }
    }

    fn coords(&self) -> (Option<u32>, Option<u32>) {
        match self {
            Entry::Keep(b) => (b.row_index, b.col_index),
            Entry::Create(d) => (d.row_index, d.col_index),
        }
    }

    fn is_part_of(&self, table_id: &str) -> bool {
        self.block_type().is_table_part() && self.parent_id() == Some(table_id)
    }

    fn is_cell_of(&self, table_id: &str) -> bool {
        self.block_type() == BlockType::TableCell && self.parent_id() == Some(table_id)
    }

    fn into_draft(self) -> BlockDraft {
        match self {
            Entry::Keep(b) => b.to_draft(),
            Entry::Create(d) => d,
        }
    }
}

/// Ordered block set of a version under construction.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    entries: Vec<Entry>,
}

impl Layout {
    /// Start from a stored version; every block is kept by reference.
    pub fn from_blocks(mut blocks: Vec<Block>) -> Self {
        blocks.sort_by_key(|b| b.order);
        Self {
            entries: blocks.into_iter().map(Entry::Keep).collect(),
        }
    }

    /// Expand template items into fresh blocks.
    ///
    /// Each table item gets a newly minted parent id, an options block when
    /// the item has options, and one cell per entry of its rows.
    pub fn from_template(items: &[TemplateItem]) -> Self {
        let mut entries = Vec::with_capacity(items.iter().map(TemplateItem::width).sum());
        for item in items {
            match item {
                TemplateItem::Text(s) => {
                    entries.push(Entry::Create(s.to_draft(new_attribute_id(), BlockType::Text)))
                }
                TemplateItem::Heading(s) => entries
                    .push(Entry::Create(s.to_draft(new_attribute_id(), BlockType::Heading))),
                TemplateItem::Hr(s) => {
                    entries.push(Entry::Create(s.to_draft(new_attribute_id(), BlockType::Hr)))
                }
                TemplateItem::Table(table) => {
                    let parent = new_attribute_id();
                    if let Some(options) = &table.options {
                        let content = match options {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        entries.push(Entry::Create(
                            BlockDraft::new(options_attribute_id(&parent), BlockType::TableOptions)
                                .part_of(parent.clone())
                                .content(content)
                                .style_classes(table.style_classes.clone()),
                        ));
                    }
                    for (r, row) in table.rows.iter().enumerate() {
                        for (c, text) in row.iter().enumerate() {
                            entries.push(Entry::Create(
                                BlockDraft::new(new_attribute_id(), BlockType::TableCell)
                                    .cell_of(parent.clone(), r as u32, c as u32)
                                    .content(text.clone())
                                    .style_classes(table.style_classes.clone()),
                            ));
                        }
                    }
                }
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn position_of(&self, attribute_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.attribute_id() == attribute_id)
    }

    /// Options block of table `table_id`, if any.
    pub fn options_of(&self, table_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.block_type() == BlockType::TableOptions && e.parent_id() == Some(table_id))
            .map(Entry::attribute_id)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Replace a block with a new revision carrying the same attribute id.
    /// Returns the new revision.
    pub fn update(
        &mut self,
        attribute_id: &str,
        content: &str,
        meta: &BlockMetadata,
    ) -> StoreResult<BlockDraft> {
        let idx = self
            .position_of(attribute_id)
            .ok_or_else(|| StoreError::BlockNotFound(attribute_id.to_string()))?;
        let draft = self.entries[idx].clone().into_draft().content(content).apply(meta);
        self.entries[idx] = Entry::Create(draft.clone());
        Ok(draft)
    }

    /// Insert a block (or a default table) after `after`, or at the end.
    ///
    /// An `after` id absent from the layout also inserts at the end. Returns
    /// the attribute ids of the inserted blocks.
    pub fn insert(&mut self, kind: InsertKind, after: Option<&str>) -> Vec<String> {
        let target = match after {
            Some(attr) => match self.position_of(attr) {
                Some(idx) => idx + 1,
                None => {
                    tracing::warn!(after = %attr, "insert anchor not found, appending");
                    self.entries.len()
                }
            },
            None => self.entries.len(),
        };

        let drafts = match kind {
            InsertKind::Table => default_table_drafts(),
            InsertKind::Text | InsertKind::Heading | InsertKind::Hr => {
                let block_type = match kind {
                    InsertKind::Heading => BlockType::Heading,
                    InsertKind::Hr => BlockType::Hr,
                    _ => BlockType::Text,
                };
                let level = (block_type == BlockType::Heading).then_some(2);
                vec![
                    BlockDraft::new(new_attribute_id(), block_type)
                        .content(format!("New {}", kind.as_str()))
                        .style_classes(format!("default-{}", kind.as_str()))
                        .level(level),
                ]
            }
        };

        let added = drafts.iter().map(|d| d.attribute_id.clone()).collect();
        self.entries
            .splice(target..target, drafts.into_iter().map(Entry::Create));
        added
    }

    /// Remove a block and, unless it is itself a cell or options block, every
    /// block whose parent id is its attribute id.
    ///
    /// An id carried by no block but used as a parent id removes that whole
    /// table. Returns the attribute ids removed, in their former order.
    pub fn remove(&mut self, attribute_id: &str) -> StoreResult<Vec<String>> {
        let cascade = match self.position_of(attribute_id) {
            Some(idx) => !self.entries[idx].block_type().is_table_part(),
            None if self.entries.iter().any(|e| e.is_part_of(attribute_id)) => true,
            None => return Err(StoreError::BlockNotFound(attribute_id.to_string())),
        };

        let (removed, kept): (Vec<Entry>, Vec<Entry>) =
            std::mem::take(&mut self.entries).into_iter().partition(|e| {
                e.attribute_id() == attribute_id || (cascade && e.parent_id() == Some(attribute_id))
            });
        self.entries = kept;
        Ok(removed.iter().map(|e| e.attribute_id().to_string()).collect())
    }

    /// Add a row of empty cells to table `table_id`.
    ///
    /// The new row goes after `after_row`, or below the last row. Cells at or
    /// below it move down one row. The new cells are placed right after the
    /// table's last block. Returns the new row index and the new cell ids.
    pub fn add_table_row(
        &mut self,
        table_id: &str,
        after_row: Option<u32>,
    ) -> StoreResult<(u32, Vec<String>)> {
        let mut max_row = None;
        let mut max_col = None;
        for entry in self.entries.iter().filter(|e| e.is_cell_of(table_id)) {
            let (row, col) = entry.coords();
            max_row = max_row.max(row);
            max_col = max_col.max(col);
        }
        let (Some(max_row), Some(max_col)) = (max_row, max_col) else {
            return Err(StoreError::TableNotFound(table_id.to_string()));
        };
        let num_cols = next_index(max_col)?;
        let new_row = next_index(after_row.unwrap_or(max_row))?;

        for entry in self.entries.iter_mut() {
            if !entry.is_cell_of(table_id) {
                continue;
            }
            let (Some(row), _) = entry.coords() else {
                continue;
            };
            if row >= new_row {
                let mut draft = entry.clone().into_draft();
                draft.row_index = Some(next_index(row)?);
                *entry = Entry::Create(draft);
            }
        }

        let insert_at = self
            .entries
            .iter()
            .rposition(|e| e.is_part_of(table_id))
            .map_or(self.entries.len(), |idx| idx + 1);
        let drafts: Vec<BlockDraft> = (0..num_cols)
            .map(|col| {
                BlockDraft::new(new_attribute_id(), BlockType::TableCell)
                    .cell_of(table_id, new_row, col)
            })
            .collect();
        let added = drafts.iter().map(|d| d.attribute_id.clone()).collect();
        self.entries
            .splice(insert_at..insert_at, drafts.into_iter().map(Entry::Create));
        Ok((new_row, added))
    }

    // =========================================================================
    // Invariants
    // =========================================================================

    /// Check table structure and attribute id uniqueness.
    ///
    /// Order density holds by construction.
    pub fn validate(&self) -> StoreResult<()> {
        let mut attrs = HashSet::new();
        let mut coords = HashSet::new();
        let mut options: HashMap<&str, &str> = HashMap::new();

        for entry in &self.entries {
            let attr = entry.attribute_id();
            if attr.is_empty() {
                return Err(StoreError::Invariant("block without attribute id".into()));
            }
            if !attrs.insert(attr) {
                return Err(StoreError::Invariant(format!("duplicate attribute id {attr}")));
            }

            let block_type = entry.block_type();
            if !block_type.is_table_part() {
                continue;
            }
            let Some(parent) = entry.parent_id() else {
                return Err(StoreError::Invariant(format!(
                    "{block_type} block {attr} has no parent id"
                )));
            };
            match block_type {
                BlockType::TableCell => {
                    let (Some(row), Some(col)) = entry.coords() else {
                        return Err(StoreError::Invariant(format!(
                            "table cell {attr} is missing row or column index"
                        )));
                    };
                    if !coords.insert((parent, row, col)) {
                        return Err(StoreError::Invariant(format!(
                            "table {parent} has two cells at ({row}, {col})"
                        )));
                    }
                }
                BlockType::TableOptions => {
                    if let Some(existing) = options.insert(parent, attr) {
                        return Err(StoreError::Invariant(format!(
                            "table {parent} has two options blocks ({existing}, {attr})"
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Storage slots with dense orders.
    pub fn into_slots(self) -> Vec<Slot> {
        self.entries
            .into_iter()
            .enumerate()
            .map(|(order, entry)| match entry {
                Entry::Keep(block) => Slot::Keep {
                    row_id: block.row_id,
                    order: order as u32,
                },
                Entry::Create(draft) => Slot::Create {
                    draft,
                    order: order as u32,
                },
            })
            .collect()
    }
}

/// Row or column index one past `index`.
fn next_index(index: u32) -> StoreResult<u32> {
    index
        .checked_add(1)
        .ok_or_else(|| StoreError::validation(format!("table index {index} is out of range")))
}

/// Options block plus a default grid of empty cells for a new table.
fn default_table_drafts() -> Vec<BlockDraft> {
    let parent = new_attribute_id();
    let mut drafts = Vec::with_capacity((1 + DEFAULT_TABLE_ROWS * DEFAULT_TABLE_COLS) as usize);
    drafts.push(
        BlockDraft::new(options_attribute_id(&parent), BlockType::TableOptions)
            .part_of(parent.clone())
            .content(default_table_options().to_string()),
    );
    for row in 0..DEFAULT_TABLE_ROWS {
        for col in 0..DEFAULT_TABLE_COLS {
            drafts.push(
                BlockDraft::new(new_attribute_id(), BlockType::TableCell)
                    .cell_of(parent.clone(), row, col),
            );
        }
    }
    drafts
}

// ============================================================================
// Tests
// ============================================================================
