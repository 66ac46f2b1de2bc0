//! Row schema for the tabular wire format.
//!
//! One `ContentRow` is one spreadsheet data row. Column order is the wire
//! format: `EXPORT_FIELDNAMES` fixes both the export header and the order
//! `to_record` emits cells in. Unused cells are empty strings, never absent.

use serde::{Deserialize, Serialize};

use crate::blocks::Button;
use crate::error::ValidationError;

/// Fixed export column order. `structure` and `message` are export-side
/// annotations the importer ignores.
pub const EXPORT_FIELDNAMES: [&str; 36] = [
    "structure",
    "message",
    "page_id",
    "slug",
    "parent",
    "web_title",
    "web_subtitle",
    "web_body",
    "whatsapp_title",
    "whatsapp_body",
    "whatsapp_template_name",
    "whatsapp_template_category",
    "example_values",
    "variation_title",
    "variation_body",
    "list_items",
    "sms_title",
    "sms_body",
    "ussd_title",
    "ussd_body",
    "messenger_title",
    "messenger_body",
    "viber_title",
    "viber_body",
    "translation_tag",
    "tags",
    "quick_replies",
    "triggers",
    "locale",
    "next_prompt",
    "buttons",
    "image_link",
    "doc_link",
    "media_link",
    "related_pages",
    "footer",
];

/// One parsed spreadsheet row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ContentRow {
    pub structure: String,
    pub message: String,
    pub page_id: Option<u64>,
    pub slug: String,
    pub parent: String,
    pub web_title: String,
    pub web_subtitle: String,
    pub web_body: String,
    pub whatsapp_title: String,
    pub whatsapp_body: String,
    pub whatsapp_template_name: String,
    pub whatsapp_template_category: String,
    pub example_values: Vec<String>,
    pub variation_title: Vec<(String, String)>,
    pub variation_body: String,
    pub list_items: Vec<String>,
    pub sms_title: String,
    pub sms_body: String,
    pub ussd_title: String,
    pub ussd_body: String,
    pub messenger_title: String,
    pub messenger_body: String,
    pub viber_title: String,
    pub viber_body: String,
    pub translation_tag: String,
    pub tags: Vec<String>,
    pub quick_replies: Vec<String>,
    pub triggers: Vec<String>,
    pub locale: String,
    pub next_prompt: String,
    pub buttons: Vec<Button>,
    pub image_link: String,
    pub doc_link: String,
    pub media_link: String,
    pub related_pages: Vec<String>,
    pub footer: String,
}

impl ContentRow {
    /// Build a row from `(header, cell)` pairs. Unknown headers are ignored;
    /// cells are trimmed. `lookup` must yield each header at most once.
    pub fn from_cells<'a>(
        cells: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ValidationError> {
        let mut row = ContentRow::default();
        for (name, value) in cells {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.trim() {
                "structure" => row.structure = value.to_string(),
                "message" => row.message = value.to_string(),
                "page_id" => {
                    row.page_id = Some(parse_page_id(value)?);
                }
                "slug" => row.slug = value.to_string(),
                "parent" => row.parent = value.to_string(),
                "web_title" => row.web_title = value.to_string(),
                "web_subtitle" => row.web_subtitle = value.to_string(),
                "web_body" => row.web_body = value.to_string(),
                "whatsapp_title" => row.whatsapp_title = value.to_string(),
                "whatsapp_body" => row.whatsapp_body = value.to_string(),
                "whatsapp_template_name" => row.whatsapp_template_name = value.to_string(),
                "whatsapp_template_category" => {
                    row.whatsapp_template_category = value.to_string()
                }
                "example_values" => row.example_values = split_list(value),
                "variation_title" => row.variation_title = split_pairs(value)?,
                "variation_body" => row.variation_body = value.to_string(),
                "list_items" => row.list_items = split_list(value),
                "sms_title" => row.sms_title = value.to_string(),
                "sms_body" => row.sms_body = value.to_string(),
                "ussd_title" => row.ussd_title = value.to_string(),
                "ussd_body" => row.ussd_body = value.to_string(),
                "messenger_title" => row.messenger_title = value.to_string(),
                "messenger_body" => row.messenger_body = value.to_string(),
                "viber_title" => row.viber_title = value.to_string(),
                "viber_body" => row.viber_body = value.to_string(),
                "translation_tag" => row.translation_tag = value.to_string(),
                "tags" => row.tags = split_list(value),
                "quick_replies" => row.quick_replies = split_list(value),
                "triggers" => row.triggers = split_list(value),
                "locale" => row.locale = value.to_string(),
                "next_prompt" => row.next_prompt = value.to_string(),
                "buttons" => row.buttons = parse_buttons(value)?,
                "image_link" => row.image_link = value.to_string(),
                "doc_link" => row.doc_link = value.to_string(),
                "media_link" => row.media_link = value.to_string(),
                "related_pages" => row.related_pages = split_list(value),
                "footer" => row.footer = value.to_string(),
                _ => {}
            }
        }
        Ok(row)
    }

    /// Render cells in `EXPORT_FIELDNAMES` order.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.structure.clone(),
            self.message.clone(),
            self.page_id.map(|id| id.to_string()).unwrap_or_default(),
            self.slug.clone(),
            self.parent.clone(),
            self.web_title.clone(),
            self.web_subtitle.clone(),
            self.web_body.clone(),
            self.whatsapp_title.clone(),
            self.whatsapp_body.clone(),
            self.whatsapp_template_name.clone(),
            self.whatsapp_template_category.clone(),
            join_list(&self.example_values),
            join_pairs(&self.variation_title),
            self.variation_body.clone(),
            join_list(&self.list_items),
            self.sms_title.clone(),
            self.sms_body.clone(),
            self.ussd_title.clone(),
            self.ussd_body.clone(),
            self.messenger_title.clone(),
            self.messenger_body.clone(),
            self.viber_title.clone(),
            self.viber_body.clone(),
            self.translation_tag.clone(),
            join_list(&self.tags),
            join_list(&self.quick_replies),
            join_list(&self.triggers),
            self.locale.clone(),
            self.next_prompt.clone(),
            serialise_buttons(&self.buttons),
            self.image_link.clone(),
            self.doc_link.clone(),
            self.media_link.clone(),
            join_list(&self.related_pages),
            self.footer.clone(),
        ]
    }

    /// An index row groups child pages: it has a web title but no parent and
    /// no channel content.
    pub fn is_page_index(&self) -> bool {
        !self.web_title.is_empty()
            && self.parent.is_empty()
            && self.web_body.is_empty()
            && !self.has_message_content()
    }

    /// Any row with a web title opens a content page.
    pub fn is_content_page(&self) -> bool {
        !self.web_title.is_empty()
    }

    pub fn is_variation_message(&self) -> bool {
        !self.variation_body.is_empty()
    }

    pub fn has_message_content(&self) -> bool {
        !self.whatsapp_body.is_empty()
            || !self.sms_body.is_empty()
            || !self.ussd_body.is_empty()
            || !self.messenger_body.is_empty()
            || !self.viber_body.is_empty()
    }
}

fn parse_page_id(value: &str) -> Result<u64, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::new("page_id", format!("'{value}' is not a page id")))
}

fn parse_buttons(value: &str) -> Result<Vec<Button>, ValidationError> {
    serde_json::from_str(value)
        .map_err(|e| ValidationError::new("buttons", format!("malformed buttons cell: {e}")))
}

/// Serialise buttons as a tagged JSON array, the button wire grammar.
pub fn serialise_buttons(buttons: &[Button]) -> String {
    if buttons.is_empty() {
        return String::new();
    }
    // Vec<Button> to JSON cannot fail.
    serde_json::to_string(buttons).unwrap_or_default()
}

/// Split a comma-separated list cell, honouring CSV-style quoting so items
/// may themselves contain commas.
pub fn split_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(value.as_bytes());
    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(|item| item.trim().to_string()).collect(),
        _ => vec![value.trim().to_string()],
    }
}

/// Join list items for a cell. Items containing commas, quotes or line
/// breaks are quoted CSV-style so `split_list` recovers them.
pub fn join_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| {
            if item.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", item.replace('"', "\"\""))
            } else {
                item.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a `key: value, key: value` cell into pairs.
pub fn split_pairs(value: &str) -> Result<Vec<(String, String)>, ValidationError> {
    let mut pairs = Vec::new();
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (key, val) = item.split_once(':').ok_or_else(|| {
            ValidationError::new(
                "variation_title",
                format!("expected 'dimension: value', got '{item}'"),
            )
        })?;
        pairs.push((key.trim().to_string(), val.trim().to_string()));
    }
    Ok(pairs)
}

pub fn join_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_cells_round_trip() {
        let items = vec![
            "health".to_string(),
            "self care, sleep".to_string(),
            "baby".to_string(),
        ];
        let cell = join_list(&items);
        assert_eq!(cell, "health, \"self care, sleep\", baby");
        assert_eq!(split_list(&cell), items);
    }

    #[test]
    fn list_items_with_line_breaks_round_trip() {
        let items = vec!["line one\nline two".to_string(), "plain".to_string()];
        let cell = join_list(&items);
        assert_eq!(cell, "\"line one\nline two\", plain");
        assert_eq!(split_list(&cell), items);
    }

    #[test]
    fn empty_list_cell() {
        assert_eq!(split_list(""), Vec::<String>::new());
        assert_eq!(join_list(&[]), "");
    }

    #[test]
    fn pair_cells_round_trip() {
        let pairs = vec![("gender".to_string(), "female".to_string())];
        let cell = join_pairs(&pairs);
        assert_eq!(cell, "gender: female");
        assert_eq!(split_pairs(&cell).unwrap(), pairs);
    }

    #[test]
    fn malformed_pair_cell_rejected() {
        let err = split_pairs("female").unwrap_err();
        assert_eq!(err.field, "variation_title");
    }

    #[test]
    fn buttons_cell_round_trip() {
        let buttons = vec![
            Button::NextMessage {
                title: "Next".to_string(),
            },
            Button::GoToPage {
                title: "Main menu".to_string(),
                slug: "main-menu".to_string(),
            },
        ];
        let cell = serialise_buttons(&buttons);
        let parsed = parse_buttons(&cell).unwrap();
        assert_eq!(parsed, buttons);
    }

    #[test]
    fn from_cells_ignores_unknown_and_empty() {
        let row = ContentRow::from_cells([
            ("slug", "first-page"),
            ("web_title", " First page "),
            ("mystery_column", "ignored"),
            ("sms_body", ""),
        ])
        .unwrap();
        assert_eq!(row.slug, "first-page");
        assert_eq!(row.web_title, "First page");
        assert!(row.sms_body.is_empty());
    }

    #[test]
    fn row_classification() {
        let index = ContentRow {
            slug: "main-menu".to_string(),
            web_title: "Main menu".to_string(),
            ..Default::default()
        };
        assert!(index.is_page_index());
        assert!(index.is_content_page());

        let page = ContentRow {
            slug: "first-page".to_string(),
            parent: "main-menu".to_string(),
            web_title: "First page".to_string(),
            whatsapp_body: "hello".to_string(),
            ..Default::default()
        };
        assert!(!page.is_page_index());
        assert!(page.is_content_page());

        let variation = ContentRow {
            slug: "first-page".to_string(),
            variation_body: "hello there".to_string(),
            ..Default::default()
        };
        assert!(variation.is_variation_message());
        assert!(!variation.is_content_page());
    }

    #[test]
    fn record_width_matches_header() {
        assert_eq!(ContentRow::default().to_record().len(), EXPORT_FIELDNAMES.len());
    }
}
