//! Groups projected rows by their business key and folds each group into a
//! single summary record.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{info, instrument};

use crate::upr::mapping::config::{ColumnMap, LatestSelection, MappingConfig};
use crate::upr::mapping::filter::parse_date;
use crate::upr::mapping::model::{CellValue, ConsolidatedRecord, GroupKey, Record};

/// Column roles needed to fold a group.
#[derive(Debug, Clone)]
pub struct Consolidator<'a> {
    pub column_map: &'a ColumnMap,
    pub group_key: &'a [String],
    pub monetary_column: &'a str,
    pub reference_date_column: &'a str,
    pub latest: LatestSelection,
}

impl<'a> Consolidator<'a> {
    pub fn from_config(config: &'a MappingConfig) -> Self {
        Self {
            column_map: &config.column_map,
            group_key: &config.group_key,
            monetary_column: &config.monetary_column,
            reference_date_column: &config.reference_date_column,
            latest: config.latest_selection,
        }
    }

    /// Partitions records by group key, preserving first-seen group order,
    /// and emits one consolidated record per group.
    #[instrument(level = "info", skip_all, fields(line_items = records.len()))]
    pub fn consolidate(&self, records: Vec<Record>) -> Vec<ConsolidatedRecord> {
        let mut order: Vec<GroupKey> = Vec::new();
        let mut groups: HashMap<GroupKey, Vec<Record>> = HashMap::new();
        for record in records {
            let key = record.key(self.group_key);
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(record);
        }

        let consolidated: Vec<ConsolidatedRecord> = order
            .into_iter()
            .filter_map(|key| {
                let members = groups.remove(&key)?;
                Some(self.fold_group(key, members))
            })
            .collect();
        info!(group_count = consolidated.len(), "records consolidated");
        consolidated
    }

    fn fold_group(&self, key: GroupKey, members: Vec<Record>) -> ConsolidatedRecord {
        let total = group_total(&members, self.monetary_column);
        let line_items = members.len();
        let latest = self.latest_member(&members);

        let mut record = Record::default();
        for destination in self.column_map.destinations() {
            let value = if destination == self.monetary_column {
                CellValue::Number(total)
            } else if self.group_key.iter().any(|column| column == destination) {
                members
                    .first()
                    .map(|member| member.get(destination).clone())
                    .unwrap_or_default()
            } else {
                latest
                    .map(|member| member.get(destination).clone())
                    .unwrap_or_default()
            };
            record.fields.insert(destination.to_string(), value);
        }

        ConsolidatedRecord {
            key,
            total,
            line_items,
            record,
        }
    }

    /// Member with the greatest reference date. The first maximal member wins
    /// ties.
    fn latest_member<'r>(&self, members: &'r [Record]) -> Option<&'r Record> {
        members.iter().fold(None, |best, candidate| match best {
            Some(current) if self.compare_dates(candidate, current) != Ordering::Greater => {
                Some(current)
            }
            _ => Some(candidate),
        })
    }

    fn compare_dates(&self, lhs: &Record, rhs: &Record) -> Ordering {
        let lhs = lhs.get(self.reference_date_column);
        let rhs = rhs.get(self.reference_date_column);
        match self.latest {
            LatestSelection::Raw => lhs.raw_text().cmp(&rhs.raw_text()),
            LatestSelection::Chronological => parse_date(lhs)
                .cmp(&parse_date(rhs))
                .then_with(|| lhs.raw_text().cmp(&rhs.raw_text())),
        }
    }
}

/// Sum of the monetary column. Non-numeric or missing values contribute 0.
pub fn group_total(members: &[Record], monetary_column: &str) -> f64 {
    members
        .iter()
        .filter_map(|member| member.get(monetary_column).as_number())
        .sum()
}

/// Top `limit` records by total, highest first.
pub fn top_by_revenue(records: &[ConsolidatedRecord], limit: usize) -> Vec<&ConsolidatedRecord> {
    let mut ranked: Vec<&ConsolidatedRecord> = records.iter().collect();
    ranked.sort_by(|lhs, rhs| rhs.total.total_cmp(&lhs.total));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        job: &str,
        foreman: &str,
        release: Option<&str>,
        amount: f64,
        date: &str,
        crew: &str,
    ) -> Record {
        let config = MappingConfig::default();
        let mut record = Record::default();
        for destination in config.column_map.destinations() {
            record.fields.insert(destination.to_string(), CellValue::Empty);
        }
        record.fields.insert("Job Number".into(), job.into());
        record.fields.insert("Foreman".into(), foreman.into());
        if let Some(release) = release {
            record.fields.insert("Work Release".into(), release.into());
        }
        record.fields.insert("PROMAX".into(), CellValue::Number(amount));
        record.fields.insert("Weekly Reference Logged Date".into(), date.into());
        record.fields.insert("Crew".into(), crew.into());
        record
    }

    #[test]
    fn same_key_rows_sum_into_one_record() {
        let config = MappingConfig::default();
        let consolidator = Consolidator::from_config(&config);
        let records = vec![
            record("J1", "A", Some("WR1"), 100.0, "2024-01-02", "early"),
            record("J1", "A", Some("WR1"), 50.0, "2024-01-03", "late"),
        ];
        let consolidated = consolidator.consolidate(records);
        assert_eq!(consolidated.len(), 1);
        let summary = &consolidated[0];
        assert_eq!(summary.total, 150.0);
        assert_eq!(summary.line_items, 2);
        assert_eq!(summary.record.get("PROMAX"), &CellValue::Number(150.0));
        assert_eq!(summary.record.get("Crew"), &CellValue::from("late"));
        assert_eq!(summary.record.get("Work Release"), &CellValue::from("WR1"));
        assert_eq!(summary.record.fields.len(), config.column_map.0.len());
    }

    #[test]
    fn sums_do_not_depend_on_row_order() {
        let config = MappingConfig::default();
        let consolidator = Consolidator::from_config(&config);
        let amounts = [0.1, 0.2, 0.3, 12.5, 1e6];
        let forward: Vec<Record> = amounts
            .iter()
            .map(|amount| record("J1", "A", Some("WR1"), *amount, "2024-01-02", "c"))
            .collect();
        let mut backward = forward.clone();
        backward.reverse();
        let lhs = consolidator.consolidate(forward)[0].total;
        let rhs = consolidator.consolidate(backward)[0].total;
        assert!((lhs - rhs).abs() < 1e-6);
    }

    #[test]
    fn missing_work_release_collides() {
        let config = MappingConfig::default();
        let consolidator = Consolidator::from_config(&config);
        let mut blank = record("J1", "A", None, 10.0, "2024-01-02", "c");
        blank.fields.insert("Work Release".into(), CellValue::from(""));
        let records = vec![
            record("J1", "A", None, 5.0, "2024-01-02", "c"),
            blank,
            record("J1", "B", None, 1.0, "2024-01-02", "c"),
        ];
        let consolidated = consolidator.consolidate(records);
        assert_eq!(consolidated.len(), 2);
        assert_eq!(consolidated[0].total, 15.0);
        assert_eq!(consolidated[0].record.get("Work Release"), &CellValue::Empty);
        assert_eq!(consolidated[1].total, 1.0);
    }

    #[test]
    fn padded_key_values_form_their_own_group() {
        let config = MappingConfig::default();
        let consolidator = Consolidator::from_config(&config);
        let consolidated = consolidator.consolidate(vec![
            record("J1", "A", Some("WR1"), 10.0, "2024-01-02", "c"),
            record(" J1", "A", Some("WR1"), 5.0, "2024-01-02", "c"),
        ]);
        assert_eq!(consolidated.len(), 2);
        assert_eq!(consolidated[1].record.get("Job Number"), &CellValue::from(" J1"));
    }

    #[test]
    fn raw_selection_compares_text_and_keeps_first_on_ties() {
        let config = MappingConfig::default();
        let consolidator = Consolidator::from_config(&config);
        let records = vec![
            record("J1", "A", Some("WR1"), 1.0, "9/1/2023", "september"),
            record("J1", "A", Some("WR1"), 1.0, "12/1/2023", "december"),
            record("J1", "A", Some("WR1"), 1.0, "9/1/2023", "duplicate"),
        ];
        let consolidated = consolidator.consolidate(records);
        assert_eq!(consolidated[0].record.get("Crew"), &CellValue::from("september"));
    }

    #[test]
    fn chronological_selection_parses_dates() {
        let config = MappingConfig {
            latest_selection: LatestSelection::Chronological,
            ..MappingConfig::default()
        };
        let consolidator = Consolidator::from_config(&config);
        let records = vec![
            record("J1", "A", Some("WR1"), 1.0, "9/1/2023", "september"),
            record("J1", "A", Some("WR1"), 1.0, "12/1/2023", "december"),
            record("J1", "A", Some("WR1"), 1.0, "garbage", "unparsed"),
        ];
        let consolidated = consolidator.consolidate(records);
        assert_eq!(consolidated[0].record.get("Crew"), &CellValue::from("december"));
    }

    #[test]
    fn non_numeric_amounts_contribute_zero() {
        let mut odd = record("J1", "A", Some("WR1"), 0.0, "2024-01-02", "c");
        odd.fields.insert("PROMAX".into(), CellValue::from("n/a"));
        let members = vec![record("J1", "A", Some("WR1"), 40.0, "2024-01-02", "c"), odd];
        assert_eq!(group_total(&members, "PROMAX"), 40.0);
        assert_eq!(group_total(&[], "PROMAX"), 0.0);
    }

    #[test]
    fn revenue_ranking_is_descending() {
        let config = MappingConfig::default();
        let consolidator = Consolidator::from_config(&config);
        let consolidated = consolidator.consolidate(vec![
            record("J1", "A", Some("WR1"), 10.0, "2024-01-02", "c"),
            record("J2", "A", Some("WR1"), 30.0, "2024-01-02", "c"),
            record("J3", "A", Some("WR1"), 20.0, "2024-01-02", "c"),
        ]);
        let top: Vec<f64> = top_by_revenue(&consolidated, 2)
            .iter()
            .map(|record| record.total)
            .collect();
        assert_eq!(top, vec![30.0, 20.0]);
    }
}
