//! Template storage.
//!
//! Templates are named lists of [`TemplateItem`]s. The store is a trait so the
//! document store can run against a directory of JSON files in production and
//! an in-memory map in tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use folio_types::{SimpleItem, TableItem, TemplateItem};
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};

/// Name of the template seeded into an empty template directory.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Keep only ASCII alphanumerics, `_` and `-`.
///
/// Returns an error when nothing is left.
pub fn sanitize_name(name: &str) -> StoreResult<String> {
    let clean: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if clean.is_empty() {
        return Err(StoreError::validation(format!("invalid template name: {name:?}")));
    }
    Ok(clean)
}

/// Items of the built-in starter template.
pub fn default_template() -> Vec<TemplateItem> {
    vec![
        TemplateItem::Heading(SimpleItem {
            content: "Untitled document".into(),
            level: Some(1),
            ..Default::default()
        }),
        TemplateItem::Text(SimpleItem {
            content: "Start writing here.".into(),
            ..Default::default()
        }),
        TemplateItem::Table(TableItem {
            options: Some(folio_types::default_table_options()),
            rows: vec![vec![String::new(); 2]; 2],
            ..Default::default()
        }),
    ]
}

/// Named template lookup and persistence.
pub trait TemplateStore: Send + Sync {
    /// Items of template `name`, or `None` if it does not exist.
    fn get(&self, name: &str) -> StoreResult<Option<Vec<TemplateItem>>>;

    /// Names of all templates, sorted.
    fn list(&self) -> StoreResult<Vec<String>>;

    /// Store `items` under the sanitized form of `name`, replacing any
    /// existing template. Returns the stored name.
    fn save(&self, name: &str, items: &[TemplateItem]) -> StoreResult<String>;
}

// ============================================================================
// Directory-backed store
// ============================================================================

/// One pretty-printed `<name>.json` file per template.
pub struct DirTemplateStore {
    dir: PathBuf,
}

impl DirTemplateStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write the starter template if the directory holds none.
    pub fn seed_default(&self) -> StoreResult<bool> {
        if !self.list()?.is_empty() {
            return Ok(false);
        }
        self.save(DEFAULT_TEMPLATE, &default_template())?;
        tracing::info!(dir = %self.dir.display(), "seeded default template");
        Ok(true)
    }

    fn path_for(&self, clean_name: &str) -> PathBuf {
        self.dir.join(format!("{clean_name}.json"))
    }
}

impl TemplateStore for DirTemplateStore {
    fn get(&self, name: &str) -> StoreResult<Option<Vec<TemplateItem>>> {
        let Ok(clean) = sanitize_name(name) else {
            return Ok(None);
        };
        let path = self.path_for(&clean);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let items = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(path = %path.display(), "invalid template file: {e}");
            StoreError::Json(e)
        })?;
        Ok(Some(items))
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn save(&self, name: &str, items: &[TemplateItem]) -> StoreResult<String> {
        let clean = sanitize_name(name)?;
        let json = serde_json::to_string_pretty(items)?;
        fs::write(self.path_for(&clean), json)?;
        tracing::info!(template = %clean, items = items.len(), "saved template");
        Ok(clean)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Template store kept in memory, for tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<BTreeMap<String, Vec<TemplateItem>>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the starter template preloaded.
    pub fn with_default() -> Self {
        let store = Self::new();
        store
            .templates
            .write()
            .insert(DEFAULT_TEMPLATE.to_string(), default_template());
        store
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn get(&self, name: &str) -> StoreResult<Option<Vec<TemplateItem>>> {
        let Ok(clean) = sanitize_name(name) else {
            return Ok(None);
        };
        Ok(self.templates.read().get(&clean).cloned())
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.templates.read().keys().cloned().collect())
    }

    fn save(&self, name: &str, items: &[TemplateItem]) -> StoreResult<String> {
        let clean = sanitize_name(name)?;
        self.templates.write().insert(clean.clone(), items.to_vec());
        Ok(clean)
    }
}

// ============================================================================
// Tests
// ============================================================================
