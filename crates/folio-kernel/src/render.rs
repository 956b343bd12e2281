//! HTML projection of a version's blocks.
//!
//! Pure functions over [`Block`] lists. Block content is already HTML and is
//! emitted as is; attribute values derived from user input are escaped.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use folio_types::{Block, BlockType};

/// Escape text for use inside a double-quoted attribute.
fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn common_attrs(block: &Block) -> String {
    let level = block.level.map(|l| l.to_string()).unwrap_or_default();
    format!(
        r#"data-block-id="{}" data-block-type="{}" data-order="{}" data-level="{}" data-alt-text="{}" class="{}""#,
        block.attribute_id,
        block.block_type,
        block.order,
        level,
        escape_attr(&block.alt_text),
        block.style_classes,
    )
}

fn opt_index(index: Option<u32>) -> String {
    index.map(|i| i.to_string()).unwrap_or_default()
}

/// HTML for a single block. Options blocks have no element of their own.
pub fn render_block(block: &Block) -> Option<String> {
    let attrs = common_attrs(block);
    match block.block_type {
        BlockType::Hr => Some(format!("<hr {attrs}>")),
        BlockType::Heading => {
            let level = block.level.filter(|l| *l > 0).unwrap_or(2);
            Some(format!("<h{level} {attrs}>{}</h{level}>", block.content))
        }
        BlockType::TableCell => Some(format!(
            r#"<td {attrs} data-row-index="{}" data-col-index="{}" data-parent-block-id="{}" contenteditable="true">{}</td>"#,
            opt_index(block.row_index),
            opt_index(block.col_index),
            block.parent_id.as_deref().unwrap_or_default(),
            block.content,
        )),
        BlockType::TableOptions => None,
        BlockType::Text => Some(format!(
            r#"<div {attrs} contenteditable="true">{}</div>"#,
            block.content
        )),
    }
}

#[derive(Default)]
struct TableParts<'a> {
    cells: Vec<&'a Block>,
    options: Option<&'a Block>,
    min_order: u32,
}

/// Column widths from an options block, if it declares any.
fn column_widths(options: Option<&Block>) -> Option<Vec<String>> {
    let block = options?;
    if block.content.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = match serde_json::from_str(&block.content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                table = block.parent_id.as_deref().unwrap_or_default(),
                "unparseable table options: {e}"
            );
            return None;
        }
    };
    let columns = value.get("columns")?.as_array()?;
    Some(
        columns
            .iter()
            .map(|w| match w.as_str() {
                Some(s) => s.to_string(),
                None => w.to_string(),
            })
            .collect(),
    )
}

fn render_table(table_id: &str, parts: &TableParts<'_>) -> String {
    let mut rows: BTreeMap<u32, BTreeMap<u32, &Block>> = BTreeMap::new();
    let mut max_col = 0;
    for cell in &parts.cells {
        let (Some(row), Some(col)) = (cell.row_index, cell.col_index) else {
            tracing::warn!(cell = %cell.attribute_id, "table cell without coordinates, skipping");
            continue;
        };
        max_col = max_col.max(col);
        rows.entry(row).or_default().insert(col, cell);
    }
    let num_cols = max_col + 1;

    let mut html = format!(r#"<table id="{table_id}" data-block-type="table">"#);
    if let Some(widths) = column_widths(parts.options) {
        html.push_str("<colgroup>");
        for i in 0..num_cols as usize {
            let width = widths.get(i).map(String::as_str).unwrap_or("auto");
            let _ = write!(html, r#"<col style="width: {};">"#, escape_attr(width));
        }
        html.push_str("</colgroup>");
    }

    html.push_str("<tbody>");
    for (row, cols) in &rows {
        html.push_str("<tr>");
        for col in 0..num_cols {
            match cols.get(&col).and_then(|cell| render_block(cell)) {
                Some(td) => html.push_str(&td),
                None => {
                    let _ = write!(
                        html,
                        r#"<td data-row-index="{row}" data-col-index="{col}" data-parent-block-id="{table_id}" contenteditable="true"></td>"#
                    );
                }
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

/// Render a version's blocks as one HTML fragment.
///
/// Blocks sharing a parent id are grouped into a `<table>` placed at the
/// smallest order among its cells and options. Missing cells become empty
/// placeholders. A table with options but no cells is skipped.
pub fn render(blocks: &[Block]) -> String {
    let mut sorted: Vec<&Block> = blocks.iter().collect();
    sorted.sort_by_key(|b| b.order);

    let mut parts: Vec<(u32, String)> = Vec::new();
    let mut tables: BTreeMap<&str, TableParts<'_>> = BTreeMap::new();

    for block in sorted {
        match (block.block_type, block.parent_id.as_deref()) {
            (BlockType::TableCell | BlockType::TableOptions, Some(parent)) => {
                let table = tables.entry(parent).or_insert_with(|| TableParts {
                    min_order: block.order,
                    ..Default::default()
                });
                table.min_order = table.min_order.min(block.order);
                if block.block_type == BlockType::TableCell {
                    table.cells.push(block);
                } else {
                    table.options = Some(block);
                }
            }
            _ => {
                if let Some(html) = render_block(block) {
                    parts.push((block.order, html));
                }
            }
        }
    }

    for (table_id, table) in &tables {
        if table.cells.is_empty() {
            tracing::warn!(table = %table_id, "table has options but no cells, skipping render");
            continue;
        }
        parts.push((table.min_order, render_table(table_id, table)));
    }

    parts.sort_by_key(|(order, _)| *order);
    parts.into_iter().map(|(_, html)| html).collect()
}

/// Text content of an HTML fragment: tags removed, common entities decoded.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    decode_entities(&text)
}

fn decode_entities(s: &str) -> String {
    const ENTITIES: [(&str, &str); 7] = [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&#x27;", "'"),
        ("&nbsp;", "\u{a0}"),
        ("&amp;", "&"),
    ];
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Tests
// ============================================================================
