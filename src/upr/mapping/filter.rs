//! Business predicates over extracted rows and projection into the
//! destination vocabulary.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::upr::mapping::config::{ColumnMap, MappingConfig};
use crate::upr::mapping::model::{CellValue, Record, Row};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

/// Parses a date-like cell. Only text is considered; anything unparseable
/// yields `None`. Offsets are dropped, keeping the wall-clock time.
pub fn parse_date(value: &CellValue) -> Option<NaiveDateTime> {
    let CellValue::Text(text) = value else {
        return None;
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.naive_local());
    }
    if let Some(datetime) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(datetime);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .map(|date| date.and_time(NaiveTime::MIN))
}

/// Most recent Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// Midnight at the start of the week containing `now`.
pub fn period_boundary(now: NaiveDateTime) -> NaiveDateTime {
    week_start(now.date()).and_time(NaiveTime::MIN)
}

/// Row known to satisfy the monetary and period predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredRow {
    row: Row,
}

impl FilteredRow {
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Re-expresses the row in the destination vocabulary. Destination
    /// columns without a source stay blank.
    pub fn project(&self, column_map: &ColumnMap) -> Record {
        let fields = column_map
            .iter()
            .map(|entry| {
                let value = entry
                    .source
                    .as_deref()
                    .and_then(|source| self.row.get(source))
                    .cloned()
                    .unwrap_or_default();
                (entry.destination.clone(), value)
            })
            .collect();
        Record { fields }
    }
}

/// Counters gathered while filtering. Each predicate is counted on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total_rows: usize,
    pub positive_amount: usize,
    pub past_period: usize,
    pub qualifying: usize,
}

impl FilterStats {
    pub fn merge(&mut self, other: FilterStats) {
        self.total_rows += other.total_rows;
        self.positive_amount += other.positive_amount;
        self.past_period += other.past_period;
        self.qualifying += other.qualifying;
    }
}

/// The two predicates a row must satisfy.
#[derive(Debug, Clone)]
pub struct Criteria {
    monetary_source: String,
    date_source: String,
    boundary: NaiveDateTime,
}

impl Criteria {
    pub fn new(
        monetary_source: impl Into<String>,
        date_source: impl Into<String>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            monetary_source: monetary_source.into(),
            date_source: date_source.into(),
            boundary: period_boundary(now),
        }
    }

    pub fn from_config(config: &MappingConfig, now: NaiveDateTime) -> Self {
        Self::new(config.monetary_source(), config.reference_date_source(), now)
    }

    pub fn boundary(&self) -> NaiveDateTime {
        self.boundary
    }

    /// Monetary value parses and is strictly positive.
    pub fn has_positive_amount(&self, row: &Row) -> bool {
        row.get(&self.monetary_source)
            .and_then(CellValue::as_number)
            .is_some_and(|amount| amount > 0.0)
    }

    /// Reference date parses and precedes the start of the current week.
    pub fn is_past_period(&self, row: &Row) -> bool {
        row.get(&self.date_source)
            .and_then(parse_date)
            .is_some_and(|date| date < self.boundary)
    }

    /// Keeps the rows satisfying both predicates, in input order.
    #[instrument(level = "debug", skip_all, fields(row_count = rows.len()))]
    pub fn apply(&self, rows: Vec<Row>) -> (Vec<FilteredRow>, FilterStats) {
        let mut stats = FilterStats {
            total_rows: rows.len(),
            ..FilterStats::default()
        };
        let mut kept = Vec::new();
        for row in rows {
            let positive = self.has_positive_amount(&row);
            let past = self.is_past_period(&row);
            stats.positive_amount += usize::from(positive);
            stats.past_period += usize::from(past);
            if positive && past {
                stats.qualifying += 1;
                kept.push(FilteredRow { row });
            }
        }
        debug!(?stats, "rows filtered");
        (kept, stats)
    }
}
