//! Run configuration passed explicitly into the pipeline.
//!
//! Every knob the reconciliation needs lives in [`MappingConfig`]; nothing is
//! read from process-wide state, so tests can build isolated configurations.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::model::SheetId;

pub const MONETARY_COLUMN: &str = "PROMAX";
pub const REFERENCE_DATE_COLUMN: &str = "Weekly Reference Logged Date";
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Destination name → source name. Order matters for display only.
const DEFAULT_COLUMN_MAP: &[(&str, Option<&str>)] = &[
    ("PROMAX", Some("Units Total Price")),
    ("Job Number", Some("Job #")),
    ("Work Order", Some("Work Order")),
    ("Work Release", Some("Work Release #")),
    ("Start Date", Some("Start Date")),
    ("Scope Number", Some("Scope Number")),
    ("Foreman", Some("Foreman")),
    ("Location", Some("Location")),
    ("Crew", Some("Crew")),
    ("% of Completion", Some("% of Completion")),
    ("Weekly Reference Logged Date", Some("Weekly Reference Logged Date")),
    ("Expected Time of Completion", None),
    ("Snapshot Date", Some("Snapshot Date")),
    ("Work Request #", Some("Work Request #")),
];

const DEFAULT_GROUP_KEY: &[&str] = &["Job Number", "Foreman", "Work Release"];

/// Destination name → archive name, for columns the archive spells differently.
const DEFAULT_ARCHIVE_RENAMES: &[(&str, &str)] = &[
    ("Work Request #", "Work Request"),
    ("Work Release", "Work Release #"),
];

/// One entry of the destination column map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub destination: String,
    /// `None` means the destination column has no source and stays blank.
    #[serde(default)]
    pub source: Option<String>,
}

/// Ordered destination → source table used to project filtered rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMap(pub Vec<ColumnMapping>);

impl Default for ColumnMap {
    fn default() -> Self {
        Self(
            DEFAULT_COLUMN_MAP
                .iter()
                .map(|(destination, source)| ColumnMapping {
                    destination: destination.to_string(),
                    source: source.map(str::to_string),
                })
                .collect(),
        )
    }
}

impl ColumnMap {
    pub fn iter(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.0.iter()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|entry| entry.destination.as_str())
    }

    /// Source column feeding the given destination column.
    pub fn source_of(&self, destination: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.destination == destination)
            .and_then(|entry| entry.source.as_deref())
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.0.iter().any(|entry| entry.destination == destination)
    }
}

/// Bidirectional destination ↔ archive column-name table. Unmapped names are
/// identical in both vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, String)>", into = "Vec<(String, String)>")]
pub struct ArchiveColumnMap {
    to_archive: BTreeMap<String, String>,
    to_destination: BTreeMap<String, String>,
}

impl ArchiveColumnMap {
    /// Builds the table from `(destination, archive)` pairs. Each name may
    /// appear at most once on each side.
    pub fn from_pairs<I, D, A>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (D, A)>,
        D: Into<String>,
        A: Into<String>,
    {
        let mut to_archive = BTreeMap::new();
        let mut to_destination = BTreeMap::new();
        for (destination, archive) in pairs {
            let destination = destination.into();
            let archive = archive.into();
            if to_archive.contains_key(&destination) || to_destination.contains_key(&archive) {
                return Err(ToolError::InvalidConfig(format!(
                    "archive rename '{destination}' -> '{archive}' is not one-to-one"
                )));
            }
            to_archive.insert(destination.clone(), archive.clone());
            to_destination.insert(archive, destination);
        }
        Ok(Self {
            to_archive,
            to_destination,
        })
    }

    /// Archive-side name of a destination column.
    pub fn archive_name<'a>(&'a self, destination: &'a str) -> &'a str {
        self.to_archive
            .get(destination)
            .map(String::as_str)
            .unwrap_or(destination)
    }

    /// Destination-side name of an archive column.
    pub fn destination_name<'a>(&'a self, archive: &'a str) -> &'a str {
        self.to_destination
            .get(archive)
            .map(String::as_str)
            .unwrap_or(archive)
    }
}

impl Default for ArchiveColumnMap {
    fn default() -> Self {
        let mut to_archive = BTreeMap::new();
        let mut to_destination = BTreeMap::new();
        for (destination, archive) in DEFAULT_ARCHIVE_RENAMES {
            to_archive.insert(destination.to_string(), archive.to_string());
            to_destination.insert(archive.to_string(), destination.to_string());
        }
        Self {
            to_archive,
            to_destination,
        }
    }
}

impl TryFrom<Vec<(String, String)>> for ArchiveColumnMap {
    type Error = ToolError;

    fn try_from(pairs: Vec<(String, String)>) -> Result<Self> {
        Self::from_pairs(pairs)
    }
}

impl From<ArchiveColumnMap> for Vec<(String, String)> {
    fn from(map: ArchiveColumnMap) -> Self {
        map.to_archive.into_iter().collect()
    }
}

/// How the "latest" member of a group is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatestSelection {
    /// Compare the reference-date field as raw text.
    #[default]
    Raw,
    /// Compare parsed dates, falling back to raw text for ties and
    /// unparseable values.
    Chronological,
}

/// Complete configuration of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Sheet whose columns define the required schema.
    pub reference_sheet: SheetId,
    /// Sheet accumulating consolidated records.
    pub archive_sheet: SheetId,
    /// When set, nothing is written to the archive.
    pub dry_run: bool,
    pub column_map: ColumnMap,
    pub monetary_column: String,
    pub reference_date_column: String,
    pub group_key: Vec<String>,
    pub archive_columns: ArchiveColumnMap,
    pub latest_selection: LatestSelection,
    pub page_size: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            reference_sheet: SheetId::new("reference"),
            archive_sheet: SheetId::new("archive"),
            dry_run: false,
            column_map: ColumnMap::default(),
            monetary_column: MONETARY_COLUMN.to_string(),
            reference_date_column: REFERENCE_DATE_COLUMN.to_string(),
            group_key: DEFAULT_GROUP_KEY.iter().map(|s| s.to_string()).collect(),
            archive_columns: ArchiveColumnMap::default(),
            latest_selection: LatestSelection::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MappingConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let config: MappingConfig = serde_json::from_str(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.reference_sheet.as_str().trim().is_empty() {
            return Err(ToolError::InvalidConfig("reference sheet id is empty".into()));
        }
        if self.archive_sheet.as_str().trim().is_empty() {
            return Err(ToolError::InvalidConfig("archive sheet id is empty".into()));
        }
        if self.page_size == 0 {
            return Err(ToolError::InvalidConfig("page size must be positive".into()));
        }
        if self.group_key.is_empty() {
            return Err(ToolError::InvalidConfig("group key has no columns".into()));
        }

        let mut seen = BTreeSet::new();
        for destination in self.column_map.destinations() {
            if !seen.insert(destination) {
                return Err(ToolError::InvalidConfig(format!(
                    "destination column '{destination}' is mapped twice"
                )));
            }
        }

        let required = self
            .group_key
            .iter()
            .chain([&self.monetary_column, &self.reference_date_column]);
        for column in required {
            if self.column_map.source_of(column).is_none() {
                return Err(ToolError::InvalidConfig(format!(
                    "column '{column}' has no source in the column map"
                )));
            }
        }
        Ok(())
    }

    /// Source column holding the monetary value.
    pub fn monetary_source(&self) -> &str {
        self.column_map
            .source_of(&self.monetary_column)
            .unwrap_or(&self.monetary_column)
    }

    /// Source column holding the reference date.
    pub fn reference_date_source(&self) -> &str {
        self.column_map
            .source_of(&self.reference_date_column)
            .unwrap_or(&self.reference_date_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MappingConfig::default();
        config.validate().expect("default configuration valid");
        assert_eq!(config.monetary_source(), "Units Total Price");
        assert_eq!(config.reference_date_source(), "Weekly Reference Logged Date");
        assert_eq!(config.column_map.source_of("Job Number"), Some("Job #"));
        assert_eq!(config.column_map.source_of("Expected Time of Completion"), None);
        assert!(config.column_map.contains("Expected Time of Completion"));
    }

    #[test]
    fn archive_renames_resolve_both_ways() {
        let map = ArchiveColumnMap::default();
        assert_eq!(map.archive_name("Work Request #"), "Work Request");
        assert_eq!(map.archive_name("Work Release"), "Work Release #");
        assert_eq!(map.archive_name("Foreman"), "Foreman");
        assert_eq!(map.destination_name("Work Request"), "Work Request #");
        assert_eq!(map.destination_name("Work Release #"), "Work Release");
        assert_eq!(map.destination_name("Crew"), "Crew");
    }

    #[test]
    fn archive_renames_must_be_one_to_one() {
        let error = ArchiveColumnMap::from_pairs([("A", "X"), ("B", "X")]).unwrap_err();
        assert!(matches!(error, ToolError::InvalidConfig(_)));
    }

    #[test]
    fn group_key_columns_must_be_mapped() {
        let config = MappingConfig {
            group_key: vec!["Expected Time of Completion".to_string()],
            ..MappingConfig::default()
        };
        assert!(matches!(config.validate(), Err(ToolError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "reference_sheet": "template",
            "archive_sheet": "master",
            "dry_run": true,
            "archive_columns": [["Work Request #", "Work Request"]],
            "latest_selection": "chronological"
        }"#;
        let config: MappingConfig = serde_json::from_str(json).expect("config parsed");
        config.validate().expect("config valid");
        assert_eq!(config.reference_sheet, SheetId::new("template"));
        assert!(config.dry_run);
        assert_eq!(config.latest_selection, LatestSelection::Chronological);
        assert_eq!(config.archive_columns.archive_name("Work Release"), "Work Release");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.column_map, ColumnMap::default());
    }
}
