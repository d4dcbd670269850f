//! Structural compatibility between source sheets and the reference schema.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::upr::mapping::error::Result;
use crate::upr::mapping::io::Workspace;
use crate::upr::mapping::model::{SheetId, SheetRef};

/// Required column names. Loaded once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSchema {
    columns: BTreeSet<String>,
}

impl ReferenceSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads the reference schema from a sheet. Failure here is fatal.
    #[instrument(level = "info", skip(workspace), fields(reference = %id))]
    pub fn load<W: Workspace + ?Sized>(workspace: &W, id: &SheetId) -> Result<Self> {
        let schema = Self::new(workspace.get_columns(id)?);
        info!(column_count = schema.columns.len(), "reference schema loaded");
        Ok(schema)
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    /// Required columns absent from `available`. Extra columns are allowed.
    pub fn missing_from<'a, I>(&self, available: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available: BTreeSet<&str> = available.into_iter().collect();
        self.columns
            .iter()
            .filter(|column| !available.contains(column.as_str()))
            .cloned()
            .collect()
    }
}

/// Why a sheet was left out of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The sheet lacks some required columns.
    MissingColumns { columns: BTreeSet<String> },
    /// The sheet's columns could not be read.
    SchemaUnreadable { error: String },
    /// The sheet's rows could not be read.
    RowsUnreadable { error: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingColumns { columns } => {
                let names: Vec<&str> = columns.iter().map(String::as_str).collect();
                write!(f, "missing columns: {}", names.join(", "))
            }
            SkipReason::SchemaUnreadable { error } => write!(f, "schema unreadable: {error}"),
            SkipReason::RowsUnreadable { error } => write!(f, "rows unreadable: {error}"),
        }
    }
}

/// A sheet that a stage skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub sheet: SheetRef,
    pub reason: SkipReason,
}

/// Checks every candidate against the reference schema. One result per
/// candidate, in candidate order; a failing sheet never stops the others.
#[instrument(level = "info", skip_all, fields(candidate_count = candidates.len()))]
pub fn match_sheets<W: Workspace + ?Sized>(
    workspace: &W,
    reference: &ReferenceSchema,
    candidates: &[SheetRef],
) -> Vec<std::result::Result<SheetRef, Skipped>> {
    candidates
        .iter()
        .map(|sheet| {
            let outcome = check_sheet(workspace, reference, sheet);
            match &outcome {
                Ok(_) => info!(sheet = %sheet.name, id = %sheet.id, "sheet matches reference schema"),
                Err(skipped) => match skipped.reason {
                    SkipReason::MissingColumns { .. } => {
                        info!(sheet = %sheet.name, id = %sheet.id, reason = %skipped.reason, "sheet skipped")
                    }
                    _ => warn!(sheet = %sheet.name, id = %sheet.id, reason = %skipped.reason, "sheet skipped"),
                },
            }
            outcome
        })
        .collect()
}

fn check_sheet<W: Workspace + ?Sized>(
    workspace: &W,
    reference: &ReferenceSchema,
    sheet: &SheetRef,
) -> std::result::Result<SheetRef, Skipped> {
    let skip = |reason| Skipped {
        sheet: sheet.clone(),
        reason,
    };
    let columns = workspace.get_columns(&sheet.id).map_err(|error| {
        skip(SkipReason::SchemaUnreadable {
            error: error.to_string(),
        })
    })?;
    let missing = reference.missing_from(columns.iter().map(String::as_str));
    if missing.is_empty() {
        Ok(sheet.clone())
    } else {
        Err(skip(SkipReason::MissingColumns { columns: missing }))
    }
}
