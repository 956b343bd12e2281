//! Template descriptors.
//!
//! A template is an ordered list of [`TemplateItem`]s, stored as a JSON array
//! tagged by `block_type`:
//!
//! ```json
//! [
//!   {"block_type": "heading", "content": "Minutes", "level": 1},
//!   {"block_type": "text", "content": "Attendees:"},
//!   {"block_type": "table", "options": {"columns": ["120px", "auto"]},
//!    "rows": [["Item", "Owner"], ["", ""]]}
//! ]
//! ```
//!
//! Table items expand into one options block (when `options` is present) and
//! one cell per entry of `rows`.

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockDraft, BlockType};

/// One entry of a template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "block_type", rename_all = "lowercase")]
pub enum TemplateItem {
    Text(SimpleItem),
    Heading(SimpleItem),
    Hr(SimpleItem),
    Table(TableItem),
}

/// A non-table block in a template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleItem {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default)]
    pub style_classes: String,
    #[serde(default)]
    pub alt_text: String,
}

/// A table in a template.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableItem {
    /// Table id in the document the template was saved from. Informational;
    /// instantiation always mints a fresh one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub style_classes: String,
}

impl TemplateItem {
    /// Describe a stored non-table block. Cells and options return `None`;
    /// tables are described by [`TableItem`] instead.
    pub fn from_block(block: &Block) -> Option<Self> {
        let item = SimpleItem {
            content: block.content.clone(),
            level: block.level,
            style_classes: block.style_classes.clone(),
            alt_text: block.alt_text.clone(),
        };
        match block.block_type {
            BlockType::Text => Some(TemplateItem::Text(item)),
            BlockType::Heading => Some(TemplateItem::Heading(item)),
            BlockType::Hr => Some(TemplateItem::Hr(item)),
            BlockType::TableCell | BlockType::TableOptions => None,
        }
    }

    /// Number of blocks this item expands into.
    pub fn width(&self) -> usize {
        match self {
            TemplateItem::Table(table) => {
                usize::from(table.options.is_some())
                    + table.rows.iter().map(Vec::len).sum::<usize>()
            }
            _ => 1,
        }
    }
}

impl SimpleItem {
    /// Draft a block of type `block_type` from this item.
    pub fn to_draft(&self, attribute_id: String, block_type: BlockType) -> BlockDraft {
        BlockDraft::new(attribute_id, block_type)
            .content(self.content.clone())
            .level(self.level)
            .style_classes(self.style_classes.clone())
            .alt_text(self.alt_text.clone())
    }
}
