use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a sheet inside a workspace. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub String);

impl SheetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SheetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SheetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Entry returned when enumerating the sheets of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRef {
    pub id: SheetId,
    pub name: String,
}

impl SheetRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: SheetId::new(id),
            name: name.into(),
        }
    }
}

/// Identifier of a column inside one sheet.
pub type ColumnId = u64;

/// Column declared by a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
}

/// Represents a scalar cell value as exposed by a workspace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Plain text.
    Text(String),
    /// Floating point number.
    Number(f64),
    /// Checkbox style boolean.
    Boolean(bool),
    /// Blank cell.
    #[default]
    Empty,
}

impl CellValue {
    /// Returns `true` for blank cells and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    /// Coerces the value into a number. Text is parsed after trimming.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            CellValue::Text(value) => value.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Raw textual rendering used for ordering and key comparison.
    pub fn raw_text(&self) -> String {
        match self {
            CellValue::Text(value) => value.clone(),
            CellValue::Number(value) => format_number(*value),
            CellValue::Boolean(value) => value.to_string(),
            CellValue::Empty => String::new(),
        }
    }

    /// Canonical key component: blank values collapse to `None`. Other text
    /// is kept verbatim, surrounding whitespace included.
    pub fn key_part(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.raw_text())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// One cell of a sheet row, addressed by column id.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub column_id: ColumnId,
    pub value: CellValue,
}

/// Row as returned by the workspace, before column resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetRow {
    pub cells: Vec<Cell>,
}

/// Row to append to a sheet. Always added below the existing rows.
pub type NewRow = SheetRow;

/// Full sheet content: column declarations plus rows in native order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<SheetRow>,
}

impl Sheet {
    /// Column title → column id lookup.
    pub fn column_ids_by_title(&self) -> BTreeMap<&str, ColumnId> {
        self.columns
            .iter()
            .map(|column| (column.title.as_str(), column.id))
            .collect()
    }

    /// Column id → column title lookup.
    pub fn column_titles_by_id(&self) -> BTreeMap<ColumnId, &str> {
        self.columns
            .iter()
            .map(|column| (column.id, column.title.as_str()))
            .collect()
    }
}

/// Row resolved to column names. Absent keys and blank values are equivalent.
pub type Row = BTreeMap<String, CellValue>;

/// Row expressed in the destination vocabulary after projection.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Record {
    pub fields: BTreeMap<String, CellValue>,
}

impl Record {
    pub fn get(&self, column: &str) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.fields.get(column).unwrap_or(EMPTY)
    }

    /// Projects the record onto the given key columns.
    pub fn key(&self, columns: &[String]) -> GroupKey {
        GroupKey(
            columns
                .iter()
                .map(|column| self.get(column).key_part())
                .collect(),
        )
    }
}

/// Composite identity of a consolidated record. Missing components compare
/// equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(pub Vec<Option<String>>);

impl GroupKey {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(|part| part.map(Into::into)).collect())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .0
            .iter()
            .map(|part| part.as_deref().unwrap_or("<none>"))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// One summary record per group key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedRecord {
    pub key: GroupKey,
    /// Sum of the monetary column across the group.
    pub total: f64,
    /// Number of line items folded into this record.
    pub line_items: usize,
    /// Destination-vocabulary fields, monetary column included.
    pub record: Record,
}
