use std::path::Path;

use chrono::NaiveDate;
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;
use upr_report_mapping::config::MappingConfig;
use upr_report_mapping::extract::resolve_rows;
use upr_report_mapping::io::excel_read;
use upr_report_mapping::io::{ExcelWorkspace, Workspace, list_all_sheets};
use upr_report_mapping::model::{CellValue, SheetId};
use upr_report_mapping::pipeline::{Pipeline, RunOutcome};

const SOURCE_HEADERS: &[&str] = &[
    "Units Total Price",
    "Job #",
    "Work Order",
    "Work Release #",
    "Start Date",
    "Scope Number",
    "Foreman",
    "Location",
    "Crew",
    "% of Completion",
    "Weekly Reference Logged Date",
    "Snapshot Date",
    "Work Request #",
];

const ARCHIVE_HEADERS: &[&str] = &[
    "PROMAX",
    "Job Number",
    "Foreman",
    "Work Release #",
    "Weekly Reference Logged Date",
    "Crew",
    "Work Request",
];

enum Value<'a> {
    Text(&'a str),
    Number(f64),
}

fn write_sheet(path: &Path, headers: &[&str], rows: &[Vec<(&str, Value)>]) {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Sheet1").expect("sheet named");
    for (col_idx, header) in headers.iter().enumerate() {
        worksheet
            .write_string(0, col_idx as u16, *header)
            .expect("header written");
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (column, value) in row {
            let col_idx = headers
                .iter()
                .position(|header| header == column)
                .expect("known column") as u16;
            let row_number = row_idx as u32 + 1;
            match value {
                Value::Text(text) => {
                    worksheet
                        .write_string(row_number, col_idx, *text)
                        .expect("cell written");
                }
                Value::Number(number) => {
                    worksheet
                        .write_number(row_number, col_idx, *number)
                        .expect("cell written");
                }
            }
        }
    }
    workbook.save(path).expect("workbook saved");
}

fn line_item<'a>(
    amount: f64,
    job: &'a str,
    crew: &'a str,
    date: &'a str,
) -> Vec<(&'a str, Value<'a>)> {
    vec![
        ("Units Total Price", Value::Number(amount)),
        ("Job #", Value::Text(job)),
        ("Foreman", Value::Text("A")),
        ("Work Release #", Value::Text("WR1")),
        ("Crew", Value::Text(crew)),
        ("Weekly Reference Logged Date", Value::Text(date)),
        ("Work Request #", Value::Text("REQ-1")),
    ]
}

fn seed_workspace(root: &Path) {
    write_sheet(&root.join("reference.xlsx"), SOURCE_HEADERS, &[]);
    write_sheet(
        &root.join("crew-a.xlsx"),
        SOURCE_HEADERS,
        &[
            line_item(100.0, "J1", "early", "2024-01-02"),
            line_item(50.0, "J1", "late", "2024-01-03"),
            line_item(25.0, "J2", "current", "2024-01-09"),
        ],
    );
    write_sheet(
        &root.join("crew-b.xlsx"),
        SOURCE_HEADERS,
        &[line_item(40.0, "J3", "solo", "2023-12-28")],
    );
    write_sheet(&root.join("archive.xlsx"), ARCHIVE_HEADERS, &[]);
}

fn now() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 10)
        .and_then(|date| date.and_hms_opt(9, 0, 0))
        .expect("valid timestamp")
}

#[test]
fn workbooks_are_listed_by_file_stem() {
    let temp_dir = tempdir().expect("temporary directory");
    seed_workspace(temp_dir.path());
    std::fs::write(temp_dir.path().join("notes.txt"), "not a workbook").expect("file written");

    let workspace = ExcelWorkspace::open(temp_dir.path()).expect("workspace opened");
    let ids: Vec<String> = list_all_sheets(&workspace, 2)
        .into_iter()
        .map(|sheet| sheet.id.to_string())
        .collect();
    assert_eq!(ids, vec!["archive", "crew-a", "crew-b", "reference"]);

    let columns = workspace
        .get_columns(&SheetId::new("reference"))
        .expect("columns read");
    assert_eq!(columns.len(), SOURCE_HEADERS.len());
}

#[test]
fn pipeline_appends_consolidated_rows_to_archive_workbook() {
    let temp_dir = tempdir().expect("temporary directory");
    seed_workspace(temp_dir.path());
    let mut workspace = ExcelWorkspace::open(temp_dir.path()).expect("workspace opened");
    let config = MappingConfig::default();

    let report = Pipeline::new(&mut workspace, &config)
        .run_at(now())
        .expect("run succeeds");
    assert_eq!(report.outcome, RunOutcome::Appended);
    assert_eq!(report.new_records.len(), 2);
    assert_eq!(report.filter.total_rows, 4);
    assert_eq!(report.filter.qualifying, 3);

    let archive = workspace
        .get_sheet(&SheetId::new("archive"))
        .expect("archive read");
    let rows = resolve_rows(&archive);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("PROMAX"), Some(&CellValue::Number(150.0)));
    assert_eq!(rows[0].get("Job Number"), Some(&CellValue::from("J1")));
    assert_eq!(rows[0].get("Crew"), Some(&CellValue::from("late")));
    assert_eq!(rows[0].get("Work Release #"), Some(&CellValue::from("WR1")));
    assert_eq!(rows[0].get("Work Request"), Some(&CellValue::from("REQ-1")));
    assert_eq!(rows[1].get("PROMAX"), Some(&CellValue::Number(40.0)));

    let again = Pipeline::new(&mut workspace, &config)
        .run_at(now())
        .expect("second run succeeds");
    assert_eq!(again.outcome, RunOutcome::NothingNew);
    assert_eq!(again.already_present, 2);
}

#[test]
fn dry_run_leaves_the_archive_workbook_untouched() {
    let temp_dir = tempdir().expect("temporary directory");
    seed_workspace(temp_dir.path());
    let archive_path = temp_dir.path().join("archive.xlsx");
    let before = std::fs::read(&archive_path).expect("archive bytes");

    let mut workspace = ExcelWorkspace::open(temp_dir.path()).expect("workspace opened");
    let config = MappingConfig {
        dry_run: true,
        ..MappingConfig::default()
    };
    let report = Pipeline::new(&mut workspace, &config)
        .run_at(now())
        .expect("run succeeds");

    assert_eq!(report.outcome, RunOutcome::DryRun);
    assert_eq!(report.archive.as_ref().map(|write| write.planned), Some(2));
    assert_eq!(std::fs::read(&archive_path).expect("archive bytes"), before);
}

#[test]
fn appending_preserves_other_worksheets() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("archive.xlsx");
    let mut workbook = Workbook::new();
    let archive = workbook.add_worksheet();
    archive.set_name("Archive").expect("sheet named");
    archive.write_string(0, 0, "Job Number").expect("header written");
    archive.write_string(1, 0, "J0").expect("cell written");
    let notes = workbook.add_worksheet();
    notes.set_name("Notes").expect("sheet named");
    notes.write_string(0, 0, "keep me").expect("cell written");
    workbook.save(&path).expect("workbook saved");

    let mut workspace = ExcelWorkspace::open(temp_dir.path()).expect("workspace opened");
    let row = upr_report_mapping::model::SheetRow {
        cells: vec![upr_report_mapping::model::Cell {
            column_id: 0,
            value: CellValue::from("J1"),
        }],
    };
    let written = workspace
        .add_rows(&SheetId::new("archive"), vec![row])
        .expect("rows appended");
    assert_eq!(written, 1);

    let worksheets = excel_read::read_worksheets(&path).expect("workbook read");
    assert_eq!(worksheets.len(), 2);
    assert_eq!(worksheets[0].rows.len(), 3);
    assert_eq!(worksheets[1].name, "Notes");
    assert_eq!(
        excel_read::cell_to_value(&worksheets[1].rows[0][0]),
        CellValue::from("keep me")
    );
}

#[test]
fn missing_workspace_directory_is_a_connectivity_failure() {
    let temp_dir = tempdir().expect("temporary directory");
    let error = ExcelWorkspace::open(temp_dir.path().join("absent")).unwrap_err();
    assert!(matches!(error, upr_report_mapping::ToolError::Connectivity(_)));
}
