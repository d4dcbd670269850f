//! End-to-end reconciliation run: discover, extract, filter, consolidate,
//! deduplicate and append, strictly in that order.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::upr::mapping::archive::{ArchiveWrite, RunMode, write_archive};
use crate::upr::mapping::config::MappingConfig;
use crate::upr::mapping::consolidate::{Consolidator, top_by_revenue};
use crate::upr::mapping::dedup::{NarrowedColumn, deduplicate};
use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::extract::extract_rows;
use crate::upr::mapping::filter::{Criteria, FilterStats};
use crate::upr::mapping::io::{Workspace, list_all_sheets};
use crate::upr::mapping::model::{ConsolidatedRecord, Record, SheetRef};
use crate::upr::mapping::schema::{ReferenceSchema, Skipped, match_sheets};

/// Records shown in log summaries.
const SUMMARY_LIMIT: usize = 5;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NoMatchingSheets,
    NoQualifyingRows,
    NothingNew,
    DryRun,
    Appended,
    WriteFailed,
}

/// Qualifying record count contributed by one matched sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetContribution {
    pub sheet: SheetRef,
    pub qualifying: usize,
}

/// Everything a run observed, for logging and the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub period_boundary: NaiveDateTime,
    pub sheets_listed: usize,
    pub matched: Vec<SheetRef>,
    pub skipped: Vec<Skipped>,
    pub contributions: Vec<SheetContribution>,
    pub filter: FilterStats,
    /// Non-empty value count per destination column over projected rows.
    pub column_fill: BTreeMap<String, usize>,
    pub consolidated: Vec<ConsolidatedRecord>,
    pub already_present: usize,
    pub existing_keys: usize,
    pub effective_key_columns: Vec<String>,
    pub narrowed_key_columns: Vec<NarrowedColumn>,
    pub archive_checked: bool,
    pub new_records: Vec<ConsolidatedRecord>,
    pub archive: Option<ArchiveWrite>,
    /// Why the archive append failed, when it did.
    pub write_error: Option<String>,
}

impl RunReport {
    fn new(period_boundary: NaiveDateTime) -> Self {
        Self {
            outcome: RunOutcome::NoMatchingSheets,
            period_boundary,
            sheets_listed: 0,
            matched: Vec::new(),
            skipped: Vec::new(),
            contributions: Vec::new(),
            filter: FilterStats::default(),
            column_fill: BTreeMap::new(),
            consolidated: Vec::new(),
            already_present: 0,
            existing_keys: 0,
            effective_key_columns: Vec::new(),
            narrowed_key_columns: Vec::new(),
            archive_checked: false,
            new_records: Vec::new(),
            archive: None,
            write_error: None,
        }
    }

    /// Consolidated records with the highest totals.
    pub fn top_by_revenue(&self, limit: usize) -> Vec<&ConsolidatedRecord> {
        top_by_revenue(&self.consolidated, limit)
    }

    /// Line items folded into the consolidated records.
    pub fn line_items(&self) -> usize {
        self.consolidated.iter().map(|record| record.line_items).sum()
    }
}

/// Runs the reconciliation against a workspace with an explicit config.
pub struct Pipeline<'a, W: Workspace + ?Sized> {
    workspace: &'a mut W,
    config: &'a MappingConfig,
}

impl<'a, W: Workspace + ?Sized> Pipeline<'a, W> {
    pub fn new(workspace: &'a mut W, config: &'a MappingConfig) -> Self {
        Self { workspace, config }
    }

    /// Runs with the local wall clock as "now".
    pub fn run(&mut self) -> Result<RunReport> {
        self.run_at(Local::now().naive_local())
    }

    /// Runs as if the current time were `now`.
    #[instrument(
        level = "info",
        skip(self),
        fields(
            reference = %self.config.reference_sheet,
            archive = %self.config.archive_sheet,
            dry_run = self.config.dry_run
        )
    )]
    pub fn run_at(&mut self, now: NaiveDateTime) -> Result<RunReport> {
        let config = self.config;
        config.validate()?;
        let criteria = Criteria::from_config(config, now);
        let mut report = RunReport::new(criteria.boundary());

        let (matched, skipped, listed) = self.discover()?;
        report.sheets_listed = listed;
        report.matched = matched;
        report.skipped = skipped;
        if report.matched.is_empty() {
            info!("no sheet matches the reference schema");
            return Ok(report);
        }

        let records = self.collect_records(&criteria, &mut report);
        info!(
            total_rows = report.filter.total_rows,
            positive_amount = report.filter.positive_amount,
            past_period = report.filter.past_period,
            qualifying = report.filter.qualifying,
            "filtering summary"
        );
        if records.is_empty() {
            report.outcome = RunOutcome::NoQualifyingRows;
            info!("no rows meet the criteria");
            return Ok(report);
        }

        report.consolidated = Consolidator::from_config(config).consolidate(records);
        info!(
            line_items = report.line_items(),
            groups = report.consolidated.len(),
            "line items consolidated"
        );
        for (rank, record) in report.top_by_revenue(SUMMARY_LIMIT).iter().enumerate() {
            info!(rank = rank + 1, key = %record.key, total = record.total, "top group by revenue");
        }

        let dedup = deduplicate(
            &*self.workspace,
            &config.archive_sheet,
            report.consolidated.clone(),
            &config.group_key,
            &config.archive_columns,
        );
        report.already_present = dedup.already_present;
        report.existing_keys = dedup.existing_keys;
        report.effective_key_columns = dedup.effective_columns;
        report.narrowed_key_columns = dedup.narrowed;
        report.archive_checked = dedup.archive_checked;
        report.new_records = dedup.new_records;
        if report.new_records.is_empty() {
            report.outcome = RunOutcome::NothingNew;
            info!("no new group keys to archive");
            return Ok(report);
        }

        let mode = RunMode::from_dry_run(config.dry_run);
        match write_archive(
            &mut *self.workspace,
            &config.archive_sheet,
            &report.new_records,
            &config.archive_columns,
            mode,
        ) {
            Ok(write) => {
                report.outcome = match mode {
                    RunMode::DryRun => RunOutcome::DryRun,
                    RunMode::Live => RunOutcome::Appended,
                };
                report.archive = Some(write);
            }
            Err(error) => {
                for record in &report.new_records {
                    warn!(key = %record.key, total = record.total, "record not archived");
                }
                report.outcome = RunOutcome::WriteFailed;
                report.write_error = Some(match error {
                    ToolError::ArchiveWrite { reason, .. } => reason,
                    other => other.to_string(),
                });
            }
        }
        Ok(report)
    }

    /// Loads the reference schema, enumerates sheets and keeps the compatible
    /// ones. Only the reference read is fatal.
    fn discover(&self) -> Result<(Vec<SheetRef>, Vec<Skipped>, usize)> {
        let reference = ReferenceSchema::load(&*self.workspace, &self.config.reference_sheet)?;
        let candidates = list_all_sheets(&*self.workspace, self.config.page_size);

        let mut matched = Vec::new();
        let mut skipped = Vec::new();
        for result in match_sheets(&*self.workspace, &reference, &candidates) {
            match result {
                Ok(sheet) => matched.push(sheet),
                Err(skip) => skipped.push(skip),
            }
        }
        info!(matched = matched.len(), skipped = skipped.len(), "sheet discovery finished");
        Ok((matched, skipped, candidates.len()))
    }

    /// Extracts, filters and projects the rows of every matched sheet. A
    /// sheet that cannot be read is recorded as skipped.
    fn collect_records(&self, criteria: &Criteria, report: &mut RunReport) -> Vec<Record> {
        let mut records = Vec::new();
        for sheet in report.matched.clone() {
            let rows = match extract_rows(&*self.workspace, &sheet) {
                Ok(rows) => rows,
                Err(skip) => {
                    warn!(sheet = %sheet.name, id = %sheet.id, reason = %skip.reason, "sheet skipped");
                    report.skipped.push(skip);
                    continue;
                }
            };

            let (kept, stats) = criteria.apply(rows);
            report.filter.merge(stats);
            info!(sheet = %sheet.name, qualifying = kept.len(), "records meeting criteria");
            report.contributions.push(SheetContribution {
                sheet,
                qualifying: kept.len(),
            });

            for row in kept {
                let record = row.project(&self.config.column_map);
                for (column, value) in &record.fields {
                    let count = report.column_fill.entry(column.clone()).or_default();
                    *count += usize::from(!value.is_empty());
                }
                records.push(record);
            }
        }
        records
    }
}
