//! Content page importer.
//!
//! Parses an uploaded CSV or XLSX file into rows, builds the page tree and
//! persists it, then resolves cross-page references. The whole import runs
//! inside a store transaction, so any error leaves the store untouched.
//!
//! Progress: 10 once the file has parsed, 10 to 80 while pages persist, 80
//! to 90 while related pages link, 90 to 99 while button targets resolve,
//! and 100 only after the import has fully succeeded.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use tracing::info;

use crate::blocks::{Button, ProfileFieldConfig};
use crate::error::ImportError;
use crate::progress::ProgressSink;
use crate::repo::ContentStore;
use crate::rows::ContentRow;
use crate::tree::{ContentNode, TreeBuilder};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
}

/// One data row as `(header, cell)` pairs, in column order.
pub(crate) type Record = Vec<(String, String)>;

/// CSV bytes that are not valid UTF-8 fall back to Latin-1, where every
/// byte maps to the code point of the same value.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

pub(crate) fn parse_table(content: &[u8], kind: FileKind) -> Result<Vec<Record>, ImportError> {
    match kind {
        FileKind::Csv => parse_csv(content),
        FileKind::Xlsx => parse_xlsx(content),
    }
}

/// Rows are tolerated at any width: short rows leave trailing columns
/// empty, and cells beyond the last header have no column name and are
/// dropped.
fn parse_csv(content: &[u8]) -> Result<Vec<Record>, ImportError> {
    let text = decode_text(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::Parse(format!("invalid CSV file: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() {
        return Err(ImportError::Parse("file has no header row".to_string()));
    }
    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ImportError::Parse(format!("invalid CSV file: {e}")))?;
        records.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(|cell| cell.to_string()))
                .collect(),
        );
    }
    Ok(records)
}

fn parse_xlsx(content: &[u8]) -> Result<Vec<Record>, ImportError> {
    let cursor = Cursor::new(content.to_vec());
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
        .map_err(|e| ImportError::Parse(format!("invalid XLSX file: {e}")))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Parse("workbook has no worksheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::Parse(format!("failed to read worksheet: {e}")))?;
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| ImportError::Parse("worksheet has no header row".to_string()))?
        .iter()
        .map(|cell| cell_to_string(cell).trim().to_string())
        .collect();
    let mut records = Vec::new();
    for row in rows {
        records.push(
            headers
                .iter()
                .cloned()
                .zip(row.iter().map(cell_to_string))
                .collect(),
        );
    }
    Ok(records)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub struct ContentImporter {
    content: Vec<u8>,
    kind: FileKind,
    purge: bool,
    locale: Option<String>,
    profiles: ProfileFieldConfig,
}

impl ContentImporter {
    pub fn new(content: Vec<u8>, kind: FileKind) -> Self {
        Self {
            content,
            kind,
            purge: false,
            locale: None,
            profiles: ProfileFieldConfig::default(),
        }
    }

    /// Delete existing pages before importing. Scoped to the target locale
    /// when one is set.
    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    /// Import only rows for this locale.
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileFieldConfig) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn perform_import(
        &self,
        store: &mut ContentStore,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), ImportError> {
        store.transaction(|store| self.run(store, progress))
    }

    fn run(
        &self,
        store: &mut ContentStore,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), ImportError> {
        let records = parse_table(&self.content, self.kind)?;
        let mut rows = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let row = ContentRow::from_cells(
                record.iter().map(|(name, value)| (name.as_str(), value.as_str())),
            )
            .map_err(|e| e.at_row(i + 1))?;
            rows.push(row);
        }
        if self.purge {
            store.delete_all(self.locale.as_deref());
        }
        progress.send(10);

        let default_locale = store.default_locale().to_string();
        let nodes = TreeBuilder::new(store, default_locale)
            .with_target_locale(self.locale.clone())
            .with_profiles(self.profiles.clone())
            .apply(&rows)?;

        let total = nodes.len().max(1);
        for (i, node) in nodes.iter().enumerate() {
            self.save_page(store, node)?;
            progress.send((10 + 70 * (i + 1) / total) as u8);
        }
        for (i, node) in nodes.iter().enumerate() {
            link_related_pages(store, node)?;
            progress.send((80 + 10 * (i + 1) / total) as u8);
        }
        for (i, node) in nodes.iter().enumerate() {
            check_button_targets(store, node)?;
            progress.send((90 + 9 * (i + 1) / total) as u8);
        }
        info!(pages = nodes.len(), "import complete");
        progress.send(100);
        Ok(())
    }

    fn save_page(&self, store: &mut ContentStore, node: &ContentNode) -> Result<(), ImportError> {
        let parent_id = if node.parent.is_empty() {
            None
        } else {
            let parent = store
                .find_by_slug(&node.parent, &node.locale)
                .ok_or_else(|| {
                    ImportError::reference(
                        node.row_num,
                        format!(
                            "cannot find parent page with slug '{}' and locale '{}'",
                            node.parent, node.locale
                        ),
                    )
                })?;
            Some(parent.id)
        };
        let existing = store
            .find_by_slug(&node.slug, &node.locale)
            .map(|page| (page.id, page.parent));
        let id = match existing {
            Some((id, old_parent)) => {
                if old_parent != parent_id {
                    return Err(ImportError::reference(
                        node.row_num,
                        format!(
                            "changing the parent of page '{}' during import is not allowed",
                            node.slug
                        ),
                    ));
                }
                store.update_page(id, node.clone())?;
                id
            }
            None => store.create_child(parent_id, node.clone())?,
        };
        store.publish_revision(id)?;
        Ok(())
    }
}

fn link_related_pages(store: &ContentStore, node: &ContentNode) -> Result<(), ImportError> {
    for slug in &node.related_pages {
        if store.find_by_slug(slug, &node.locale).is_none() {
            return Err(ImportError::reference(
                node.row_num,
                format!(
                    "cannot find related page with slug '{slug}' and locale '{}'",
                    node.locale
                ),
            ));
        }
    }
    Ok(())
}

fn check_button_targets(store: &ContentStore, node: &ContentNode) -> Result<(), ImportError> {
    for block in &node.whatsapp_body {
        for button in &block.buttons {
            if let Button::GoToPage { title, slug } = button {
                if store.find_by_slug(slug, &node.locale).is_none() {
                    return Err(ImportError::reference(
                        node.row_num,
                        format!(
                            "no page found with slug '{slug}' for go_to_page button '{title}' on page '{}'",
                            node.slug
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}
