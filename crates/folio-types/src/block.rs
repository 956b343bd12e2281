//! Block types: the canonical block value and its building pieces.
//!
//! A block row is immutable once stored. Editing a block stores a new row that
//! carries the same `attribute_id` forward, so the attribute id is the durable
//! identity and the row id only names one revision of it.
//!
//! Tables are not stored as blocks of their own. A table is every block that
//! shares one `parent_id`: zero or one [`BlockType::TableOptions`] block plus
//! any number of [`BlockType::TableCell`] blocks with row/column coordinates.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use strum::EnumString;

use crate::ids::BlockRowId;

/// Column widths given to a table created without explicit options.
pub const DEFAULT_TABLE_COLUMNS: [&str; 2] = ["150px", "150px"];

/// Rows in a table created by an insert.
pub const DEFAULT_TABLE_ROWS: u32 = 2;

/// Columns in a table created by an insert.
pub const DEFAULT_TABLE_COLS: u32 = 2;

/// What a stored block *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum BlockType {
    /// Editable paragraph.
    #[default]
    Text,
    /// Heading; `level` picks the tag.
    Heading,
    /// Horizontal rule.
    Hr,
    /// One cell of a table. Requires `parent_id`, `row_index`, `col_index`.
    TableCell,
    /// Table-level settings as serialized JSON. Requires `parent_id`.
    TableOptions,
}

impl BlockType {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Heading => "heading",
            BlockType::Hr => "hr",
            BlockType::TableCell => "table-cell",
            BlockType::TableOptions => "table-options",
        }
    }

    /// Cells and options belong to a table and need a parent id.
    pub fn is_table_part(&self) -> bool {
        matches!(self, BlockType::TableCell | BlockType::TableOptions)
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an insert adds to a document.
///
/// `Table` expands into an options block plus a default grid of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InsertKind {
    Text,
    Heading,
    Hr,
    Table,
}

impl InsertKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InsertKind::Text => "text",
            InsertKind::Heading => "heading",
            InsertKind::Hr => "hr",
            InsertKind::Table => "table",
        }
    }
}

/// Default options record for a freshly inserted table.
pub fn default_table_options() -> serde_json::Value {
    serde_json::json!({ "columns": DEFAULT_TABLE_COLUMNS })
}

/// A block as stored in one version.
///
/// `order` is the block's position within the version it was loaded from;
/// the same row may sit at different orders in different versions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub row_id: BlockRowId,
    pub order: u32,
    pub attribute_id: String,
    pub block_type: BlockType,
    pub content: String,
    pub level: Option<u8>,
    pub style_classes: String,
    pub alt_text: String,
    pub parent_id: Option<String>,
    pub row_index: Option<u32>,
    pub col_index: Option<u32>,
}

impl Block {
    /// Attach a row id and order to a draft.
    pub fn from_draft(row_id: BlockRowId, order: u32, draft: BlockDraft) -> Self {
        Self {
            row_id,
            order,
            attribute_id: draft.attribute_id,
            block_type: draft.block_type,
            content: draft.content,
            level: draft.level,
            style_classes: draft.style_classes,
            alt_text: draft.alt_text,
            parent_id: draft.parent_id,
            row_index: draft.row_index,
            col_index: draft.col_index,
        }
    }

    /// The stored fields without identity, for deriving an edited revision.
    pub fn to_draft(&self) -> BlockDraft {
        BlockDraft {
            attribute_id: self.attribute_id.clone(),
            block_type: self.block_type,
            content: self.content.clone(),
            level: self.level,
            style_classes: self.style_classes.clone(),
            alt_text: self.alt_text.clone(),
            parent_id: self.parent_id.clone(),
            row_index: self.row_index,
            col_index: self.col_index,
        }
    }

    /// True if this is a cell or options block of table `table_id`.
    pub fn belongs_to_table(&self, table_id: &str) -> bool {
        self.block_type.is_table_part() && self.parent_id.as_deref() == Some(table_id)
    }
}

/// A block's stored fields before it has a row id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDraft {
    pub attribute_id: String,
    pub block_type: BlockType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub style_classes: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub row_index: Option<u32>,
    #[serde(default)]
    pub col_index: Option<u32>,
}

impl BlockDraft {
    /// Start a draft with the two required fields and empty defaults.
    pub fn new(attribute_id: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            block_type,
            content: String::new(),
            level: None,
            style_classes: String::new(),
            alt_text: String::new(),
            parent_id: None,
            row_index: None,
            col_index: None,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn level(mut self, level: Option<u8>) -> Self {
        self.level = level;
        self
    }

    pub fn style_classes(mut self, classes: impl Into<String>) -> Self {
        self.style_classes = classes.into();
        self
    }

    pub fn alt_text(mut self, alt: impl Into<String>) -> Self {
        self.alt_text = alt.into();
        self
    }

    /// Make this a cell at (`row`, `col`) of table `parent_id`.
    pub fn cell_of(mut self, parent_id: impl Into<String>, row: u32, col: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.row_index = Some(row);
        self.col_index = Some(col);
        self
    }

    /// Attach to table `parent_id` without coordinates (options blocks).
    pub fn part_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Apply the overrides present in `meta`; absent keys keep current values
    /// and `null` clears a field.
    pub fn apply(mut self, meta: &BlockMetadata) -> Self {
        if let Some(block_type) = meta.block_type {
            self.block_type = block_type;
        }
        if let Some(classes) = &meta.style_classes {
            self.style_classes = classes.clone().unwrap_or_default();
        }
        if let Some(level) = meta.level {
            self.level = level;
        }
        if let Some(alt) = &meta.alt_text {
            self.alt_text = alt.clone().unwrap_or_default();
        }
        if let Some(parent) = &meta.parent_block_id {
            self.parent_id = parent.clone();
        }
        if let Some(row) = meta.row_index {
            self.row_index = row;
        }
        if let Some(col) = meta.col_index {
            self.col_index = col;
        }
        self
    }
}

/// Field overrides sent alongside an edit.
///
/// Every key is optional. An absent key keeps the block's value; an explicit
/// `null` clears it (string fields become empty). Unknown keys are ignored so
/// clients may send their whole local block record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub style_classes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub level: Option<Option<u8>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub parent_block_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub row_index: Option<Option<u32>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub col_index: Option<Option<u32>>,
}

/// Present key: `Some(value)`, with `null` as `Some(None)`. Absent keys never
/// reach this and fall back to `None` through `#[serde(default)]`.
fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

// ============================================================================
// Tests
// ============================================================================
