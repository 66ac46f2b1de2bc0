//! In-memory content store with JSON persistence.
//!
//! Pages live in an `IndexMap` keyed by id; map order is creation order,
//! which doubles as sibling order within a parent. Imports run inside
//! `transaction`, which snapshots the store and restores it on error, so a
//! failed import leaves no partial state behind.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assessments::Assessment;
use crate::error::ImportError;
use crate::ordered_sets::OrderedContentSet;
use crate::tree::{ContentNode, PageLookup};

pub type PageId = u64;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredPage {
    pub id: PageId,
    /// None means the page sits at the locale root.
    pub parent: Option<PageId>,
    /// Number of published revisions; 0 means draft-only.
    pub revision: u32,
    pub node: ContentNode,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContentStore {
    default_locale: String,
    next_id: PageId,
    pages: IndexMap<PageId, StoredPage>,
    ordered_sets: IndexMap<String, OrderedContentSet>,
    #[serde(default)]
    assessments: Vec<Assessment>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new("en")
    }
}

impl ContentStore {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            next_id: 1,
            pages: IndexMap::new(),
            ordered_sets: IndexMap::new(),
            assessments: Vec::new(),
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn page(&self, id: PageId) -> Option<&StoredPage> {
        self.pages.get(&id)
    }

    pub fn pages(&self) -> impl Iterator<Item = &StoredPage> {
        self.pages.values()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn find_by_slug(&self, slug: &str, locale: &str) -> Option<&StoredPage> {
        self.pages
            .values()
            .find(|p| p.node.slug == slug && p.node.locale == locale)
    }

    /// Locales present in the store, in first-seen order.
    pub fn locales(&self) -> Vec<String> {
        let mut locales = Vec::new();
        for page in self.pages.values() {
            if !locales.contains(&page.node.locale) {
                locales.push(page.node.locale.clone());
            }
        }
        locales
    }

    /// Direct children of `parent` (or locale roots for `None`), in
    /// creation order.
    pub fn children_of(&self, parent: Option<PageId>, locale: &str) -> Vec<&StoredPage> {
        self.pages
            .values()
            .filter(|p| p.parent == parent && p.node.locale == locale)
            .collect()
    }

    /// Insert a new page under `parent`. The `(slug, locale)` pair must be
    /// unused.
    pub fn create_child(
        &mut self,
        parent: Option<PageId>,
        node: ContentNode,
    ) -> Result<PageId, ImportError> {
        if self.find_by_slug(&node.slug, &node.locale).is_some() {
            return Err(ImportError::Store(format!(
                "page with slug '{}' and locale '{}' already exists",
                node.slug, node.locale
            )));
        }
        if let Some(parent_id) = parent {
            if !self.pages.contains_key(&parent_id) {
                return Err(ImportError::Store(format!(
                    "no page with id {parent_id} to attach '{}' under",
                    node.slug
                )));
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, slug = %node.slug, locale = %node.locale, "created page");
        self.pages.insert(
            id,
            StoredPage {
                id,
                parent,
                revision: 0,
                node,
            },
        );
        Ok(id)
    }

    /// Replace a page's content, keeping its id, parent and position.
    pub fn update_page(&mut self, id: PageId, node: ContentNode) -> Result<(), ImportError> {
        match self.pages.get_mut(&id) {
            Some(page) => {
                page.node = node;
                Ok(())
            }
            None => Err(ImportError::Store(format!("no page with id {id}"))),
        }
    }

    pub fn publish_revision(&mut self, id: PageId) -> Result<u32, ImportError> {
        match self.pages.get_mut(&id) {
            Some(page) => {
                page.revision += 1;
                Ok(page.revision)
            }
            None => Err(ImportError::Store(format!("no page with id {id}"))),
        }
    }

    /// Remove every page, or only one locale's pages.
    pub fn delete_all(&mut self, locale: Option<&str>) {
        match locale {
            Some(locale) => self.pages.retain(|_, p| p.node.locale != locale),
            None => self.pages.clear(),
        }
    }

    pub fn upsert_ordered_set(&mut self, set: OrderedContentSet) {
        self.ordered_sets.insert(set.name.clone(), set);
    }

    pub fn ordered_sets(&self) -> impl Iterator<Item = &OrderedContentSet> {
        self.ordered_sets.values()
    }

    pub fn delete_all_ordered_sets(&mut self) {
        self.ordered_sets.clear();
    }

    /// Replace an assessment with the same `(slug, locale)` in place, or
    /// append a new one.
    pub fn upsert_assessment(&mut self, assessment: Assessment) {
        match self
            .assessments
            .iter_mut()
            .find(|a| a.slug == assessment.slug && a.locale == assessment.locale)
        {
            Some(existing) => *existing = assessment,
            None => self.assessments.push(assessment),
        }
    }

    pub fn assessments(&self) -> impl Iterator<Item = &Assessment> {
        self.assessments.iter()
    }

    /// Remove every assessment, or only one locale's.
    pub fn delete_all_assessments(&mut self, locale: Option<&str>) {
        match locale {
            Some(locale) => self.assessments.retain(|a| a.locale != locale),
            None => self.assessments.clear(),
        }
    }

    /// Run `f` against the store; on error every change it made is undone.
    pub fn transaction<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

impl PageLookup for ContentStore {
    fn page_exists(&self, slug: &str, locale: &str) -> bool {
        self.find_by_slug(slug, locale).is_some()
    }
}
