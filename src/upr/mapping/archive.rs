//! Appends new consolidated records to the archive.
//!
//! Dry runs and live runs share [`plan_append`]; only the final
//! [`Workspace::add_rows`] call is conditional.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::upr::mapping::config::ArchiveColumnMap;
use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::io::Workspace;
use crate::upr::mapping::model::{Cell, ConsolidatedRecord, NewRow, Sheet, SheetId};

/// Whether the archive is actually modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Live,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { RunMode::DryRun } else { RunMode::Live }
    }
}

/// Rows that would be appended, mapped onto the archive's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendPlan {
    pub rows: Vec<NewRow>,
    /// Destination fields without an archive column, rendered as
    /// `field (looking for 'archive name')`.
    pub missing_columns: BTreeSet<String>,
}

/// Outcome of the archive step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveWrite {
    pub mode: RunMode,
    pub planned: usize,
    /// Rows reported written by the workspace; zero in dry runs.
    pub written: usize,
    pub missing_columns: BTreeSet<String>,
}

/// Maps each record's non-empty fields onto archive column ids. Fields the
/// archive lacks are reported and left out; the rest of the row is kept.
pub fn plan_append(
    records: &[ConsolidatedRecord],
    archive: &Sheet,
    renames: &ArchiveColumnMap,
) -> AppendPlan {
    let column_ids = archive.column_ids_by_title();
    let mut missing_columns = BTreeSet::new();

    let rows = records
        .iter()
        .map(|consolidated| {
            let mut cells = Vec::new();
            for (field, value) in &consolidated.record.fields {
                let archive_name = renames.archive_name(field);
                match column_ids.get(archive_name) {
                    Some(column_id) if !value.is_empty() => cells.push(Cell {
                        column_id: *column_id,
                        value: value.clone(),
                    }),
                    Some(_) => {}
                    None => {
                        missing_columns.insert(format!("{field} (looking for '{archive_name}')"));
                    }
                }
            }
            NewRow { cells }
        })
        .collect();

    AppendPlan {
        rows,
        missing_columns,
    }
}

/// Plans the append against the live archive layout and, in live mode,
/// performs it. Failures are not retried.
#[instrument(
    level = "info",
    skip_all,
    fields(archive = %archive_id, record_count = records.len(), ?mode)
)]
pub fn write_archive<W: Workspace + ?Sized>(
    workspace: &mut W,
    archive_id: &SheetId,
    records: &[ConsolidatedRecord],
    renames: &ArchiveColumnMap,
    mode: RunMode,
) -> Result<ArchiveWrite> {
    let archive_failure = |error: ToolError| ToolError::ArchiveWrite {
        archive: archive_id.clone(),
        reason: error.to_string(),
    };

    let archive = match (workspace.get_sheet(archive_id), mode) {
        (Ok(archive), _) => archive,
        (Err(error), RunMode::DryRun) => {
            warn!(%error, "could not read archive layout; every field reported as missing");
            Sheet {
                id: archive_id.clone(),
                name: archive_id.to_string(),
                columns: Vec::new(),
                rows: Vec::new(),
            }
        }
        (Err(error), RunMode::Live) => return Err(archive_failure(error)),
    };
    let plan = plan_append(records, &archive, renames);
    if !plan.missing_columns.is_empty() {
        warn!(missing = ?plan.missing_columns, "archive is missing columns; those fields are skipped");
    }

    let planned = plan.rows.len();
    let written = match mode {
        RunMode::DryRun => {
            for record in records {
                info!(
                    key = %record.key,
                    total = record.total,
                    line_items = record.line_items,
                    "would append record"
                );
            }
            info!(planned, "dry run: archive left untouched");
            0
        }
        RunMode::Live => {
            let written = workspace
                .add_rows(archive_id, plan.rows)
                .map_err(|error| match error {
                    ToolError::ArchiveWrite { .. } => error,
                    other => archive_failure(other),
                })?;
            if written < planned {
                warn!(planned, written, "archive accepted only part of the rows");
            } else {
                info!(written, "records appended to archive");
            }
            written
        }
    };

    Ok(ArchiveWrite {
        mode,
        planned,
        written,
        missing_columns: plan.missing_columns,
    })
}
