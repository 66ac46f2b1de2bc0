//! Tree Builder: turns an ordered sequence of rows into a page hierarchy.
//!
//! Rows are processed in file order, single pass. The first row for a
//! `(slug, locale)` creates the node and attaches the page-level fields;
//! every later row for the same key appends, either a channel message or a
//! variation on the last WhatsApp message. Parents resolve by slug and must
//! be already built in this pass or pre-existing in the store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocks::{Channel, MessageBlock, ProfileFieldConfig};
use crate::codec;
use crate::error::{ImportError, ValidationError};
use crate::rows::ContentRow;

pub const DEFAULT_TEMPLATE_CATEGORY: &str = "UTILITY";

/// Lookup seam for pages that already exist outside the current import pass.
pub trait PageLookup {
    fn page_exists(&self, slug: &str, locale: &str) -> bool;
}

/// One page being built or read: the tree-side representation of a page.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ContentNode {
    pub slug: String,
    pub locale: String,
    /// Slug of the parent page; empty means "under the locale's index root".
    pub parent: String,
    /// 1-based data-row number of the row that created this node.
    pub row_num: usize,
    /// Index nodes group child pages and carry no channel content.
    pub is_index: bool,
    pub title: String,
    pub subtitle: String,
    pub web_body: String,
    pub enable_web: bool,
    pub enable_whatsapp: bool,
    pub whatsapp_title: String,
    pub is_whatsapp_template: bool,
    pub whatsapp_template_name: String,
    pub whatsapp_template_category: String,
    pub whatsapp_body: Vec<MessageBlock>,
    pub enable_sms: bool,
    pub sms_title: String,
    pub sms_body: Vec<MessageBlock>,
    pub enable_ussd: bool,
    pub ussd_title: String,
    pub ussd_body: Vec<MessageBlock>,
    pub enable_messenger: bool,
    pub messenger_title: String,
    pub messenger_body: Vec<MessageBlock>,
    pub enable_viber: bool,
    pub viber_title: String,
    pub viber_body: Vec<MessageBlock>,
    /// Shared identity key linking translations of the same page.
    pub translation_key: String,
    pub tags: Vec<String>,
    pub quick_replies: Vec<String>,
    pub triggers: Vec<String>,
    pub related_pages: Vec<String>,
}

impl ContentNode {
    pub fn body(&self, channel: Channel) -> &[MessageBlock] {
        match channel {
            Channel::Web => &[],
            Channel::Whatsapp => &self.whatsapp_body,
            Channel::Sms => &self.sms_body,
            Channel::Ussd => &self.ussd_body,
            Channel::Messenger => &self.messenger_body,
            Channel::Viber => &self.viber_body,
        }
    }

    fn push_block(&mut self, channel: Channel, block: MessageBlock) {
        match channel {
            Channel::Web => {}
            Channel::Whatsapp => {
                self.enable_whatsapp = true;
                self.whatsapp_body.push(block);
            }
            Channel::Sms => {
                self.enable_sms = true;
                self.sms_body.push(block);
            }
            Channel::Ussd => {
                self.enable_ussd = true;
                self.ussd_body.push(block);
            }
            Channel::Messenger => {
                self.enable_messenger = true;
                self.messenger_body.push(block);
            }
            Channel::Viber => {
                self.enable_viber = true;
                self.viber_body.push(block);
            }
        }
    }

    pub fn message_count(&self) -> usize {
        Channel::MESSAGING
            .iter()
            .map(|&c| self.body(c).len())
            .max()
            .unwrap_or(0)
    }
}

pub struct TreeBuilder<'a> {
    lookup: &'a dyn PageLookup,
    default_locale: String,
    /// When set, rows for other locales are skipped entirely.
    target_locale: Option<String>,
    profiles: ProfileFieldConfig,
    nodes: IndexMap<(String, String), ContentNode>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(lookup: &'a dyn PageLookup, default_locale: impl Into<String>) -> Self {
        Self {
            lookup,
            default_locale: default_locale.into(),
            target_locale: None,
            profiles: ProfileFieldConfig::default(),
            nodes: IndexMap::new(),
        }
    }

    pub fn with_target_locale(mut self, locale: Option<String>) -> Self {
        self.target_locale = locale;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileFieldConfig) -> Self {
        self.profiles = profiles;
        self
    }

    /// Consume rows in file order and emit nodes in first-seen order.
    pub fn apply(mut self, rows: &[ContentRow]) -> Result<Vec<ContentNode>, ImportError> {
        // Rows without a locale inherit the locale of the last page row.
        let mut prev_locale: Option<String> = None;
        for (i, row) in rows.iter().enumerate() {
            let row_num = i + 1;
            let locale = self.row_locale(row, prev_locale.as_deref());
            if let Some(target) = &self.target_locale {
                if &locale != target {
                    debug!(slug = %row.slug, %locale, "skipping row for other locale");
                    continue;
                }
            }
            if row.slug.is_empty() {
                return Err(ValidationError::new("slug", "row has no slug").at_row(row_num));
            }

            let key = (row.slug.clone(), locale.clone());
            if let Some(node) = self.nodes.get_mut(&key) {
                if row.is_variation_message() {
                    Self::append_variation(&self.profiles, node, row, row_num)?;
                } else {
                    Self::append_messages(&self.profiles, node, row, row_num)?;
                }
            } else if row.is_variation_message() {
                return Err(ImportError::reference(
                    row_num,
                    format!(
                        "variation for page with slug '{}' and locale '{}', but no such page exists",
                        row.slug, locale
                    ),
                ));
            } else if row.is_content_page() {
                self.create_node(key, row, row_num, &locale)?;
                prev_locale = Some(locale);
            } else {
                return Err(ImportError::reference(
                    row_num,
                    format!(
                        "message for page with slug '{}' and locale '{}', but no such page exists",
                        row.slug, locale
                    ),
                ));
            }
        }
        Ok(self.nodes.into_values().collect())
    }

    fn row_locale(&self, row: &ContentRow, prev: Option<&str>) -> String {
        if !row.locale.is_empty() {
            row.locale.clone()
        } else if let Some(prev) = prev {
            prev.to_string()
        } else if let Some(target) = &self.target_locale {
            target.clone()
        } else {
            self.default_locale.clone()
        }
    }

    fn create_node(
        &mut self,
        key: (String, String),
        row: &ContentRow,
        row_num: usize,
        locale: &str,
    ) -> Result<(), ImportError> {
        let is_index = row.is_page_index();
        if !is_index && !row.parent.is_empty() {
            self.resolve_parent(&row.parent, locale, row_num)?;
        }

        let mut node = ContentNode {
            slug: row.slug.clone(),
            locale: locale.to_string(),
            parent: row.parent.clone(),
            row_num,
            is_index,
            title: row.web_title.clone(),
            subtitle: row.web_subtitle.clone(),
            web_body: row.web_body.clone(),
            enable_web: !row.web_body.is_empty(),
            translation_key: row.translation_tag.clone(),
            tags: row.tags.clone(),
            quick_replies: row.quick_replies.clone(),
            triggers: row.triggers.clone(),
            related_pages: row.related_pages.clone(),
            ..Default::default()
        };

        if !row.whatsapp_body.is_empty() {
            node.whatsapp_title = row.whatsapp_title.clone();
        }
        if !row.whatsapp_template_name.is_empty() {
            node.is_whatsapp_template = true;
            node.whatsapp_template_name = row.whatsapp_template_name.clone();
            node.whatsapp_template_category = if row.whatsapp_template_category.is_empty() {
                DEFAULT_TEMPLATE_CATEGORY.to_string()
            } else {
                row.whatsapp_template_category.clone()
            };
        }
        if !row.sms_body.is_empty() {
            node.sms_title = row.sms_title.clone();
        }
        if !row.ussd_body.is_empty() {
            node.ussd_title = row.ussd_title.clone();
        }
        if !row.messenger_body.is_empty() {
            node.messenger_title = row.messenger_title.clone();
        }
        if !row.viber_body.is_empty() {
            node.viber_title = row.viber_title.clone();
        }

        if !is_index {
            Self::append_messages(&self.profiles, &mut node, row, row_num)?;
        }
        debug!(slug = %node.slug, locale = %node.locale, is_index, "created node");
        self.nodes.insert(key, node);
        Ok(())
    }

    fn resolve_parent(
        &self,
        parent: &str,
        locale: &str,
        row_num: usize,
    ) -> Result<(), ImportError> {
        let seen_in_pass = self
            .nodes
            .contains_key(&(parent.to_string(), locale.to_string()));
        if seen_in_pass || self.lookup.page_exists(parent, locale) {
            return Ok(());
        }
        Err(ImportError::reference(
            row_num,
            format!("cannot find parent page with slug '{parent}' and locale '{locale}'"),
        ))
    }

    fn append_messages(
        profiles: &ProfileFieldConfig,
        node: &mut ContentNode,
        row: &ContentRow,
        row_num: usize,
    ) -> Result<(), ImportError> {
        for channel in Channel::MESSAGING {
            if let Some(block) =
                codec::decode_message(channel, row, profiles).map_err(|e| e.at_row(row_num))?
            {
                node.push_block(channel, block);
            }
        }
        Ok(())
    }

    fn append_variation(
        profiles: &ProfileFieldConfig,
        node: &mut ContentNode,
        row: &ContentRow,
        row_num: usize,
    ) -> Result<(), ImportError> {
        let variation = codec::decode_variation(row, profiles).map_err(|e| e.at_row(row_num))?;
        let Some(block) = node.whatsapp_body.last_mut() else {
            return Err(ValidationError::new(
                "variation_body",
                format!(
                    "variation for page '{}' with no preceding WhatsApp message",
                    node.slug
                ),
            )
            .at_row(row_num));
        };
        block.variation_messages.push(variation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FixedPages(HashSet<(String, String)>);

    impl PageLookup for FixedPages {
        fn page_exists(&self, slug: &str, locale: &str) -> bool {
            self.0.contains(&(slug.to_string(), locale.to_string()))
        }
    }

    fn no_pages() -> FixedPages {
        FixedPages(HashSet::new())
    }

    fn index_row(slug: &str, title: &str) -> ContentRow {
        ContentRow {
            slug: slug.to_string(),
            web_title: title.to_string(),
            locale: "English".to_string(),
            ..Default::default()
        }
    }

    fn page_row(slug: &str, parent: &str, whatsapp: &str) -> ContentRow {
        ContentRow {
            slug: slug.to_string(),
            parent: parent.to_string(),
            web_title: slug.to_string(),
            whatsapp_body: whatsapp.to_string(),
            locale: "English".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn first_row_creates_later_rows_append() {
        let lookup = no_pages();
        let rows = vec![
            index_row("main-menu", "Main menu"),
            page_row("first-page", "main-menu", "message one"),
            ContentRow {
                slug: "first-page".to_string(),
                whatsapp_body: "message two".to_string(),
                ..Default::default()
            },
        ];
        let nodes = TreeBuilder::new(&lookup, "English").apply(&rows).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_index);
        assert_eq!(nodes[1].whatsapp_body.len(), 2);
        assert_eq!(nodes[1].whatsapp_body[1].message, "message two");
    }

    #[test]
    fn append_tolerates_repeated_page_fields() {
        let lookup = no_pages();
        let mut second = page_row("first-page", "main-menu", "message two");
        second.tags = vec!["health".to_string()];
        let rows = vec![
            index_row("main-menu", "Main menu"),
            page_row("first-page", "main-menu", "message one"),
            second,
        ];
        let nodes = TreeBuilder::new(&lookup, "English").apply(&rows).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].whatsapp_body.len(), 2);
        // Page-level fields come from the first row only.
        assert!(nodes[1].tags.is_empty());
    }

    #[test]
    fn forward_parent_reference_rejected() {
        let lookup = no_pages();
        let rows = vec![
            index_row("main-menu", "Main menu"),
            page_row("child", "late-parent", "hello"),
            page_row("late-parent", "main-menu", "hello"),
        ];
        let err = TreeBuilder::new(&lookup, "English")
            .apply(&rows)
            .unwrap_err();
        assert_eq!(err.row_num(), Some(2));
        assert!(matches!(err, ImportError::Reference { .. }));
    }

    #[test]
    fn parent_may_pre_exist_in_store() {
        let lookup = FixedPages(
            [("main-menu".to_string(), "English".to_string())]
                .into_iter()
                .collect(),
        );
        let rows = vec![page_row("child", "main-menu", "hello")];
        let nodes = TreeBuilder::new(&lookup, "English").apply(&rows).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn variation_attaches_to_last_whatsapp_message() {
        let lookup = no_pages();
        let rows = vec![
            index_row("main-menu", "Main menu"),
            page_row("first-page", "main-menu", "message one"),
            ContentRow {
                slug: "first-page".to_string(),
                variation_title: vec![("gender".to_string(), "female".to_string())],
                variation_body: "message one, for women".to_string(),
                ..Default::default()
            },
        ];
        let nodes = TreeBuilder::new(&lookup, "English").apply(&rows).unwrap();
        let block = &nodes[1].whatsapp_body[0];
        assert_eq!(block.variation_messages.len(), 1);
        assert_eq!(block.variation_messages[0].message, "message one, for women");
    }

    #[test]
    fn variation_for_unknown_page_rejected() {
        let lookup = no_pages();
        let rows = vec![ContentRow {
            slug: "ghost".to_string(),
            variation_title: vec![("gender".to_string(), "female".to_string())],
            variation_body: "hello".to_string(),
            locale: "English".to_string(),
            ..Default::default()
        }];
        let err = TreeBuilder::new(&lookup, "English")
            .apply(&rows)
            .unwrap_err();
        assert_eq!(err.row_num(), Some(1));
    }

    #[test]
    fn codec_errors_carry_row_numbers() {
        let lookup = no_pages();
        let rows = vec![
            index_row("main-menu", "Main menu"),
            {
                let mut row = page_row("first-page", "main-menu", "hello {{1}}{{3}}");
                row.locale = "English".to_string();
                row
            },
        ];
        let err = TreeBuilder::new(&lookup, "English")
            .apply(&rows)
            .unwrap_err();
        assert_eq!(err.row_num(), Some(2));
        assert!(matches!(err, ImportError::RowValidation { ref field, .. } if field == "message"));
    }

    #[test]
    fn target_locale_skips_other_rows() {
        let lookup = no_pages();
        let mut portuguese = index_row("menu-principal", "Menu principal");
        portuguese.locale = "Portuguese".to_string();
        let rows = vec![index_row("main-menu", "Main menu"), portuguese];
        let nodes = TreeBuilder::new(&lookup, "English")
            .with_target_locale(Some("Portuguese".to_string()))
            .apply(&rows)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].slug, "menu-principal");
    }

    #[test]
    fn template_category_defaults() {
        let lookup = no_pages();
        let mut row = page_row("tpl-page", "", "hello");
        row.parent = String::new();
        row.web_body = "web copy".to_string();
        row.whatsapp_template_name = "welcome_01".to_string();
        let nodes = TreeBuilder::new(&lookup, "English").apply(&[row]).unwrap();
        assert!(nodes[0].is_whatsapp_template);
        assert_eq!(nodes[0].whatsapp_template_category, "UTILITY");
    }
}
