//! Ordered content sets: named, ordered sequences of pages with optional
//! per-entry send timing, imported and exported as their own tabular file.
//!
//! The timing columns are parallel lists: item `i` of Time, Unit, Before Or
//! After and Contact Field all describe entry `i`. A `-` item marks a gap.
//! Timing is all-or-none per entry. A single contact field value applies to
//! every entry.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ImportError, ValidationError};
use crate::importer::{parse_table, FileKind};
use crate::progress::ProgressSink;
use crate::repo::ContentStore;
use crate::rows::{join_list, join_pairs, split_list, split_pairs};

pub const ORDERED_SET_FIELDNAMES: [&str; 7] = [
    "Name",
    "Profile Fields",
    "Page Slugs",
    "Time",
    "Unit",
    "Before Or After",
    "Contact Field",
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Months,
}

impl TimeUnit {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_ascii_lowercase().as_str() {
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            "days" => Ok(TimeUnit::Days),
            "months" => Ok(TimeUnit::Months),
            _ => Err(ValidationError::new(
                "Unit",
                format!("'{value}' is not one of minutes, hours, days, months"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Months => "months",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BeforeOrAfter {
    Before,
    After,
}

impl BeforeOrAfter {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_ascii_lowercase().as_str() {
            "before" => Ok(BeforeOrAfter::Before),
            "after" => Ok(BeforeOrAfter::After),
            _ => Err(ValidationError::new(
                "Before Or After",
                format!("'{value}' is not 'before' or 'after'"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BeforeOrAfter::Before => "before",
            BeforeOrAfter::After => "after",
        }
    }
}

/// When an entry's page should go out, relative to a date held in a contact
/// field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    pub amount: u32,
    pub unit: TimeUnit,
    pub edge: BeforeOrAfter,
    pub contact_field: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderedSetEntry {
    pub slug: String,
    pub timing: Option<Timing>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderedContentSet {
    pub name: String,
    pub profile_fields: Vec<(String, String)>,
    pub entries: Vec<OrderedSetEntry>,
}

pub struct OrderedSetImporter {
    content: Vec<u8>,
    kind: FileKind,
    purge: bool,
}

impl OrderedSetImporter {
    pub fn new(content: Vec<u8>, kind: FileKind) -> Self {
        Self {
            content,
            kind,
            purge: false,
        }
    }

    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
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
        if self.purge {
            store.delete_all_ordered_sets();
        }
        progress.send(10);
        let total = records.len().max(1);
        for (i, record) in records.iter().enumerate() {
            let row_num = i + 1;
            let set = parse_set(record, store).map_err(|e| e.at_row(row_num))?;
            store.upsert_ordered_set(set);
            progress.send((10 + 90 * (i + 1) / total) as u8);
        }
        info!(sets = records.len(), "ordered set import complete");
        progress.send(100);
        Ok(())
    }
}

fn cell<'a>(record: &'a [(String, String)], name: &str) -> &'a str {
    record
        .iter()
        .find(|(header, _)| header == name)
        .map(|(_, value)| value.trim())
        .unwrap_or("")
}

fn is_gap(value: &str) -> bool {
    value.is_empty() || value == "-"
}

/// Expand a parallel-list cell to `len` items. An empty cell means "no
/// values"; a single value broadcasts when `broadcast` is set.
fn expand_list(
    value: &str,
    len: usize,
    name: &str,
    broadcast: bool,
) -> Result<Vec<String>, ValidationError> {
    if is_gap(value) {
        return Ok(vec!["-".to_string(); len]);
    }
    let items = split_list(value);
    if items.len() == len {
        Ok(items)
    } else if broadcast && items.len() == 1 {
        Ok(vec![items[0].clone(); len])
    } else {
        Err(ValidationError::new(
            name,
            format!(
                "expected {len} items to match Page Slugs, got {}",
                items.len()
            ),
        ))
    }
}

fn parse_set(
    record: &[(String, String)],
    store: &ContentStore,
) -> Result<OrderedContentSet, ValidationError> {
    let name = cell(record, "Name");
    if name.is_empty() {
        return Err(ValidationError::new("Name", "ordered set has no name"));
    }
    let profile_cell = cell(record, "Profile Fields");
    let profile_fields = if is_gap(profile_cell) {
        Vec::new()
    } else {
        split_pairs(profile_cell)
            .map_err(|e| ValidationError::new("Profile Fields", e.message))?
    };

    let slugs = split_list(cell(record, "Page Slugs"));
    let times = expand_list(cell(record, "Time"), slugs.len(), "Time", false)?;
    let units = expand_list(cell(record, "Unit"), slugs.len(), "Unit", false)?;
    let edges = expand_list(
        cell(record, "Before Or After"),
        slugs.len(),
        "Before Or After",
        false,
    )?;
    let contact_fields = expand_list(
        cell(record, "Contact Field"),
        slugs.len(),
        "Contact Field",
        true,
    )?;

    let mut entries = Vec::with_capacity(slugs.len());
    for (i, slug) in slugs.iter().enumerate() {
        if is_gap(slug) {
            continue;
        }
        if !store.pages().any(|p| &p.node.slug == slug) {
            return Err(ValidationError::new(
                "Page Slugs",
                format!("no page found with slug '{slug}'"),
            ));
        }
        let parts = [&times[i], &units[i], &edges[i], &contact_fields[i]];
        let missing = parts.iter().filter(|p| is_gap(p)).count();
        let timing = match missing {
            4 => None,
            0 => Some(Timing {
                amount: times[i].parse().map_err(|_| {
                    ValidationError::new("Time", format!("'{}' is not a whole number", times[i]))
                })?,
                unit: TimeUnit::parse(&units[i])?,
                edge: BeforeOrAfter::parse(&edges[i])?,
                contact_field: contact_fields[i].clone(),
            }),
            _ => {
                return Err(ValidationError::new(
                    "Time",
                    format!(
                        "entry '{slug}': time, unit, before-or-after and contact field must be \
                         given together or all left out"
                    ),
                ))
            }
        };
        entries.push(OrderedSetEntry {
            slug: slug.clone(),
            timing,
        });
    }

    Ok(OrderedContentSet {
        name: name.to_string(),
        profile_fields,
        entries,
    })
}

/// Render every ordered set as one row each, in `ORDERED_SET_FIELDNAMES`
/// column order.
pub fn export_ordered_sets(store: &ContentStore) -> Vec<Vec<String>> {
    store.ordered_sets().map(set_to_record).collect()
}

fn set_to_record(set: &OrderedContentSet) -> Vec<String> {
    let slugs: Vec<String> = set.entries.iter().map(|e| e.slug.clone()).collect();
    let any_timing = set.entries.iter().any(|e| e.timing.is_some());
    let (times, units, edges, contact_fields) = if any_timing {
        let mut times = Vec::new();
        let mut units = Vec::new();
        let mut edges = Vec::new();
        let mut contact_fields = Vec::new();
        for entry in &set.entries {
            match &entry.timing {
                Some(t) => {
                    times.push(t.amount.to_string());
                    units.push(t.unit.as_str().to_string());
                    edges.push(t.edge.as_str().to_string());
                    contact_fields.push(t.contact_field.clone());
                }
                None => {
                    times.push("-".to_string());
                    units.push("-".to_string());
                    edges.push("-".to_string());
                    contact_fields.push("-".to_string());
                }
            }
        }
        (
            join_list(&times),
            join_list(&units),
            join_list(&edges),
            join_list(&contact_fields),
        )
    } else {
        Default::default()
    };

    vec![
        set.name.clone(),
        join_pairs(&set.profile_fields),
        join_list(&slugs),
        times,
        units,
        edges,
        contact_fields,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CollectingSink;
    use crate::tree::ContentNode;

    fn store_with_pages(slugs: &[&str]) -> ContentStore {
        let mut store = ContentStore::default();
        for slug in slugs {
            store
                .create_child(
                    None,
                    ContentNode {
                        slug: slug.to_string(),
                        locale: "en".to_string(),
                        title: slug.to_string(),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        store
    }

    fn import(store: &mut ContentStore, csv: &str) -> Result<(), ImportError> {
        let mut sink = CollectingSink::default();
        OrderedSetImporter::new(csv.as_bytes().to_vec(), FileKind::Csv)
            .perform_import(store, &mut sink)
    }

    #[test]
    fn imports_sets_with_timing() {
        let mut store = store_with_pages(&["week-one", "week-two"]);
        let csv = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Pregnancy,gender: female,\"week-one, week-two\",\"5, 10\",\"days, days\",\"before, after\",edd
";
        import(&mut store, csv).unwrap();
        let set = store.ordered_sets().next().unwrap();
        assert_eq!(set.name, "Pregnancy");
        assert_eq!(set.profile_fields, vec![("gender".to_string(), "female".to_string())]);
        assert_eq!(set.entries.len(), 2);
        let timing = set.entries[0].timing.as_ref().unwrap();
        assert_eq!(timing.amount, 5);
        assert_eq!(timing.unit, TimeUnit::Days);
        assert_eq!(timing.edge, BeforeOrAfter::Before);
        // The single contact field applies to both entries.
        assert_eq!(set.entries[1].timing.as_ref().unwrap().contact_field, "edd");
    }

    #[test]
    fn timing_columns_may_be_absent() {
        let mut store = store_with_pages(&["week-one"]);
        let csv = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Onboarding,,week-one,,,,
";
        import(&mut store, csv).unwrap();
        let set = store.ordered_sets().next().unwrap();
        assert_eq!(set.entries[0].timing, None);
    }

    #[test]
    fn mismatched_list_lengths_rejected() {
        let mut store = store_with_pages(&["week-one", "week-two"]);
        let csv = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Broken,,\"week-one, week-two\",5,\"days, days\",\"before, before\",edd
";
        let err = import(&mut store, csv).unwrap_err();
        assert_eq!(err.row_num(), Some(1));
        assert_eq!(store.ordered_sets().count(), 0);
    }

    #[test]
    fn partial_timing_rejected() {
        let mut store = store_with_pages(&["week-one"]);
        let csv = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Broken,,week-one,5,days,-,edd
";
        let err = import(&mut store, csv).unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn unknown_slug_rejected() {
        let mut store = store_with_pages(&["week-one"]);
        let csv = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Broken,,ghost-page,,,,
";
        let err = import(&mut store, csv).unwrap_err();
        assert!(err.to_string().contains("ghost-page"));
    }

    #[test]
    fn export_import_round_trip() {
        let mut store = store_with_pages(&["week-one", "week-two"]);
        let csv = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Pregnancy,gender: female,\"week-one, week-two\",\"5, -\",\"days, -\",\"before, -\",\"edd, -\"
";
        import(&mut store, csv).unwrap();
        let original: Vec<_> = store.ordered_sets().cloned().collect();

        let records = export_ordered_sets(&store);
        let mut csv_out = String::from("Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field\n");
        for record in &records {
            let quoted: Vec<String> = record
                .iter()
                .map(|cell| {
                    if cell.contains(',') {
                        format!("\"{cell}\"")
                    } else {
                        cell.clone()
                    }
                })
                .collect();
            csv_out.push_str(&quoted.join(","));
            csv_out.push('\n');
        }

        let mut restored = store_with_pages(&["week-one", "week-two"]);
        import(&mut restored, &csv_out).unwrap();
        let reimported: Vec<_> = restored.ordered_sets().cloned().collect();
        assert_eq!(reimported, original);
    }

    #[test]
    fn reimport_replaces_set_by_name() {
        let mut store = store_with_pages(&["week-one", "week-two"]);
        let first = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Pregnancy,,week-one,,,,
";
        let second = "\
Name,Profile Fields,Page Slugs,Time,Unit,Before Or After,Contact Field
Pregnancy,,\"week-one, week-two\",,,,
";
        import(&mut store, first).unwrap();
        import(&mut store, second).unwrap();
        assert_eq!(store.ordered_sets().count(), 1);
        assert_eq!(store.ordered_sets().next().unwrap().entries.len(), 2);
    }
}
