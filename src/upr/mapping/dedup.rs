//! Removes consolidated records whose group key already exists in the archive.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::upr::mapping::config::ArchiveColumnMap;
use crate::upr::mapping::extract::resolve_rows;
use crate::upr::mapping::io::Workspace;
use crate::upr::mapping::model::{CellValue, ConsolidatedRecord, GroupKey, Sheet, SheetId};

/// A key column the archive does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrowedColumn {
    pub destination: String,
    pub archive: String,
}

/// Group keys already present in the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveIndex {
    effective_columns: Vec<String>,
    narrowed: Vec<NarrowedColumn>,
    keys: HashSet<GroupKey>,
}

impl ArchiveIndex {
    /// Indexes the archive rows on the key columns it actually carries.
    ///
    /// Key columns absent from the archive are dropped from the effective key,
    /// which makes matching coarser. When none remain, the full key is kept and
    /// every archive row contributes an all-missing key.
    pub fn build(archive: &Sheet, key_columns: &[String], renames: &ArchiveColumnMap) -> Self {
        let archive_titles: BTreeSet<&str> =
            archive.columns.iter().map(|column| column.title.as_str()).collect();

        let (available, missing): (Vec<&String>, Vec<&String>) = key_columns
            .iter()
            .partition(|column| archive_titles.contains(renames.archive_name(column)));

        let narrowed: Vec<NarrowedColumn> = missing
            .into_iter()
            .map(|column| NarrowedColumn {
                destination: column.clone(),
                archive: renames.archive_name(column).to_string(),
            })
            .collect();
        for column in &narrowed {
            warn!(
                column = %column.destination,
                archive_column = %column.archive,
                "archive lacks key column; duplicate detection narrowed"
            );
        }

        let effective_columns: Vec<String> = if available.is_empty() {
            warn!("archive carries no key column; comparing on the full key");
            key_columns.to_vec()
        } else {
            available.into_iter().cloned().collect()
        };

        let archive_columns: Vec<&str> = effective_columns
            .iter()
            .map(|column| renames.archive_name(column))
            .collect();
        let keys = resolve_rows(archive)
            .iter()
            .map(|row| {
                GroupKey(
                    archive_columns
                        .iter()
                        .map(|column| row.get(*column).and_then(CellValue::key_part))
                        .collect(),
                )
            })
            .collect();

        Self {
            effective_columns,
            narrowed,
            keys,
        }
    }

    pub fn effective_columns(&self) -> &[String] {
        &self.effective_columns
    }

    pub fn narrowed(&self) -> &[NarrowedColumn] {
        &self.narrowed
    }

    /// Number of distinct keys found in the archive.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether the record's key, projected onto the effective columns, exists.
    pub fn contains(&self, record: &ConsolidatedRecord) -> bool {
        self.keys.contains(&record.record.key(&self.effective_columns))
    }
}

/// Result of comparing consolidated records with the archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupOutcome {
    pub new_records: Vec<ConsolidatedRecord>,
    pub already_present: usize,
    pub existing_keys: usize,
    pub effective_columns: Vec<String>,
    pub narrowed: Vec<NarrowedColumn>,
    /// `false` when the archive could not be read and nothing was filtered.
    pub archive_checked: bool,
}

/// Splits records into new ones and ones already archived, keeping order.
pub fn partition_new(
    records: Vec<ConsolidatedRecord>,
    index: &ArchiveIndex,
) -> (Vec<ConsolidatedRecord>, usize) {
    let (existing, new): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|record| index.contains(record));
    (new, existing.len())
}

/// Reads the archive and drops records it already holds. An unreadable
/// archive keeps every record.
#[instrument(
    level = "info",
    skip_all,
    fields(archive = %archive_id, record_count = records.len())
)]
pub fn deduplicate<W: Workspace + ?Sized>(
    workspace: &W,
    archive_id: &SheetId,
    records: Vec<ConsolidatedRecord>,
    key_columns: &[String],
    renames: &ArchiveColumnMap,
) -> DedupOutcome {
    let archive = match workspace.get_sheet(archive_id) {
        Ok(archive) => archive,
        Err(error) => {
            warn!(%error, "could not read archive; treating every record as new");
            return DedupOutcome {
                new_records: records,
                already_present: 0,
                existing_keys: 0,
                effective_columns: key_columns.to_vec(),
                narrowed: Vec::new(),
                archive_checked: false,
            };
        }
    };

    let index = ArchiveIndex::build(&archive, key_columns, renames);
    let (new_records, already_present) = partition_new(records, &index);
    info!(
        existing_keys = index.len(),
        new = new_records.len(),
        already_present,
        effective_columns = ?index.effective_columns(),
        "archive compared"
    );

    DedupOutcome {
        new_records,
        already_present,
        existing_keys: index.len(),
        effective_columns: index.effective_columns,
        narrowed: index.narrowed,
        archive_checked: true,
    }
}
