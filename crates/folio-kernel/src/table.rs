//! Tables as seen through a version's blocks.

use std::collections::{BTreeMap, HashSet};

use folio_types::{Block, BlockType, TableItem, TemplateItem};

use crate::render::strip_tags;

/// Cells and options of one table.
#[derive(Debug)]
pub struct TableView<'a> {
    pub id: &'a str,
    pub options: Option<&'a Block>,
    pub cells: Vec<&'a Block>,
}

impl<'a> TableView<'a> {
    /// Collect table `table_id` from `blocks`. `None` if no block belongs to it.
    pub fn collect(blocks: &'a [Block], table_id: &'a str) -> Option<Self> {
        let mut view = TableView {
            id: table_id,
            options: None,
            cells: Vec::new(),
        };
        let mut found = false;
        for block in blocks.iter().filter(|b| b.belongs_to_table(table_id)) {
            found = true;
            match block.block_type {
                BlockType::TableOptions => view.options = Some(block),
                _ => view.cells.push(block),
            }
        }
        found.then_some(view)
    }

    /// Cell contents as rows, using `f` to project each cell.
    ///
    /// Rows come in row-index order; gaps between row indices are closed.
    /// Every row has as many columns as the widest row; missing cells are
    /// empty strings.
    pub fn grid(&self, f: impl Fn(&Block) -> String) -> Vec<Vec<String>> {
        let mut rows: BTreeMap<u32, BTreeMap<u32, &Block>> = BTreeMap::new();
        for cell in &self.cells {
            if let (Some(r), Some(c)) = (cell.row_index, cell.col_index) {
                rows.entry(r).or_default().insert(c, cell);
            }
        }
        let num_cols = rows
            .values()
            .filter_map(|cols| cols.keys().next_back())
            .max()
            .map_or(0, |max| max + 1);

        rows.values()
            .map(|cols| {
                (0..num_cols)
                    .map(|c| cols.get(&c).map(|cell| f(cell)).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    /// Cell text with markup removed.
    pub fn plain_grid(&self) -> Vec<Vec<String>> {
        self.grid(|cell| strip_tags(&cell.content))
    }

    /// Describe this table as a template entry.
    pub fn to_item(&self) -> TableItem {
        let options = self.options.map(|o| {
            serde_json::from_str(&o.content)
                .unwrap_or_else(|_| serde_json::Value::String(o.content.clone()))
        });
        let style_classes = self
            .cells
            .first()
            .map(|c| c.style_classes.clone())
            .unwrap_or_default();
        TableItem {
            parent_block_id: Some(self.id.to_string()),
            options,
            rows: self.grid(|cell| cell.content.clone()),
            style_classes,
        }
    }
}

/// Describe a version's structure as template items.
///
/// Tables are emitted once, at the position of their first block. A table
/// with options but no cells is dropped, matching what rendering shows.
pub fn to_template(blocks: &[Block]) -> Vec<TemplateItem> {
    let mut sorted: Vec<&Block> = blocks.iter().collect();
    sorted.sort_by_key(|b| b.order);

    let mut seen_tables: HashSet<&str> = HashSet::new();
    let mut items = Vec::new();
    for block in sorted {
        if let Some(item) = TemplateItem::from_block(block) {
            items.push(item);
            continue;
        }
        let Some(table_id) = block.parent_id.as_deref() else {
            continue;
        };
        if !seen_tables.insert(table_id) {
            continue;
        }
        if let Some(view) = TableView::collect(blocks, table_id)
            && !view.cells.is_empty()
        {
            items.push(TemplateItem::Table(view.to_item()));
        }
    }
    items
}
