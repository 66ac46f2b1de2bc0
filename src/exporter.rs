//! Content page exporter and tabular writers.
//!
//! The exporter walks the store depth-first per locale and flattens each
//! page into rows: one row per message position, page-level fields repeated
//! on every row, variation rows directly after the message they vary. The
//! `structure` column records the position in the tree ("Menu 1", "Sub
//! 1.2"); the importer ignores it.

use std::collections::HashSet;

use tracing::debug;

use crate::blocks::Channel;
use crate::codec;
use crate::error::ExportError;
use crate::repo::{ContentStore, StoredPage};
use crate::rows::{ContentRow, EXPORT_FIELDNAMES};

pub struct ContentExporter<'a> {
    store: &'a ContentStore,
    slugs: Option<HashSet<String>>,
}

impl<'a> ContentExporter<'a> {
    pub fn new(store: &'a ContentStore) -> Self {
        Self { store, slugs: None }
    }

    /// Restrict the export to these content pages. Index rows still appear
    /// so the file keeps its shape.
    pub fn with_slugs(mut self, slugs: Option<Vec<String>>) -> Self {
        self.slugs = slugs.map(|s| s.into_iter().collect());
        self
    }

    pub fn perform_export(&self) -> Vec<ContentRow> {
        let mut rows = Vec::new();
        for locale in self.store.locales() {
            for (i, root) in self.store.children_of(None, &locale).iter().enumerate() {
                self.export_page(root, &format!("Menu {}", i + 1), &mut rows);
            }
        }
        debug!(rows = rows.len(), "export complete");
        rows
    }

    fn export_page(&self, page: &StoredPage, structure: &str, rows: &mut Vec<ContentRow>) {
        if page.node.is_index {
            rows.push(index_row(page, structure));
        } else if self.included(&page.node.slug) {
            export_content_page(page, structure, rows);
        }
        let child_base = structure.replace("Menu", "Sub");
        for (j, child) in self
            .store
            .children_of(Some(page.id), &page.node.locale)
            .iter()
            .enumerate()
        {
            self.export_page(child, &format!("{}.{}", child_base, j + 1), rows);
        }
    }

    fn included(&self, slug: &str) -> bool {
        match &self.slugs {
            Some(slugs) => slugs.contains(slug),
            None => true,
        }
    }
}

fn index_row(page: &StoredPage, structure: &str) -> ContentRow {
    ContentRow {
        structure: structure.to_string(),
        page_id: Some(page.id),
        slug: page.node.slug.clone(),
        web_title: page.node.title.clone(),
        translation_tag: page.node.translation_key.clone(),
        locale: page.node.locale.clone(),
        ..Default::default()
    }
}

fn export_content_page(page: &StoredPage, structure: &str, rows: &mut Vec<ContentRow>) {
    let node = &page.node;
    let base = ContentRow {
        structure: structure.to_string(),
        page_id: Some(page.id),
        slug: node.slug.clone(),
        parent: node.parent.clone(),
        web_title: node.title.clone(),
        web_subtitle: node.subtitle.clone(),
        web_body: node.web_body.clone(),
        whatsapp_title: node.whatsapp_title.clone(),
        whatsapp_template_name: node.whatsapp_template_name.clone(),
        whatsapp_template_category: if node.is_whatsapp_template {
            node.whatsapp_template_category.clone()
        } else {
            String::new()
        },
        sms_title: node.sms_title.clone(),
        ussd_title: node.ussd_title.clone(),
        messenger_title: node.messenger_title.clone(),
        viber_title: node.viber_title.clone(),
        translation_tag: node.translation_key.clone(),
        tags: node.tags.clone(),
        quick_replies: node.quick_replies.clone(),
        triggers: node.triggers.clone(),
        locale: node.locale.clone(),
        related_pages: node.related_pages.clone(),
        ..Default::default()
    };

    let count = node.message_count();
    if count == 0 {
        let mut row = base;
        row.message = "1".to_string();
        rows.push(row);
        return;
    }
    for position in 0..count {
        let mut row = base.clone();
        row.message = (position + 1).to_string();
        for channel in Channel::MESSAGING {
            if let Some(block) = node.body(channel).get(position) {
                codec::encode_message(channel, block, &mut row);
            }
        }
        rows.push(row);
        if let Some(block) = node.whatsapp_body.get(position) {
            for variation in &block.variation_messages {
                let mut vrow = base.clone();
                vrow.message = (position + 1).to_string();
                codec::encode_variation(variation, &mut vrow);
                rows.push(vrow);
            }
        }
    }
}

/// Writes tabular records out as CSV or XLSX bytes.
pub struct ExportWriter<'a> {
    headers: &'a [&'a str],
    records: Vec<Vec<String>>,
}

impl<'a> ExportWriter<'a> {
    pub fn new(headers: &'a [&'a str], records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    pub fn content(rows: &[ContentRow]) -> ExportWriter<'static> {
        ExportWriter {
            headers: &EXPORT_FIELDNAMES,
            records: rows.iter().map(ContentRow::to_record).collect(),
        }
    }

    pub fn write_csv(&self) -> Result<Vec<u8>, ExportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.headers)?;
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer
            .into_inner()
            .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))
    }

    /// Every cell is written as text so numeric-looking message content
    /// survives a reimport unchanged.
    pub fn write_xlsx(&self) -> Result<Vec<u8>, ExportError> {
        use rust_xlsxwriter::{Format, Workbook};

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let header_format = Format::new().set_bold();
        for (c, name) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, c as u16, *name, &header_format)?;
        }
        for (r, record) in self.records.iter().enumerate() {
            for (c, value) in record.iter().enumerate() {
                if !value.is_empty() {
                    worksheet.write_string((r + 1) as u32, c as u16, value)?;
                }
            }
        }
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();
        Ok(workbook.save_to_buffer()?)
    }
}
