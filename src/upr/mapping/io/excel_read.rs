use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::{Duration, NaiveDate};

use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::model::{Cell, CellValue, Column, Sheet, SheetId, SheetRow};

/// Raw worksheet content positioned at its top-left used cell.
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetData {
    pub name: String,
    /// Absolute `(row, column)` of the first cell in `rows`.
    pub origin: (u32, u32),
    pub rows: Vec<Vec<DataType>>,
}

/// Reads every worksheet of a workbook, in workbook order.
pub fn read_worksheets(path: &Path) -> Result<Vec<WorksheetData>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names().to_owned();

    let mut worksheets = Vec::with_capacity(names.len());
    for name in names {
        let range = read_required_sheet(&mut workbook, &name)?;
        worksheets.push(WorksheetData {
            origin: range.start().unwrap_or((0, 0)),
            rows: range.rows().map(<[DataType]>::to_vec).collect(),
            name,
        });
    }
    Ok(worksheets)
}

/// Reads the first worksheet as a sheet: the first used row declares the
/// column titles, the column id is the absolute column index.
pub fn read_sheet(path: &Path, id: &SheetId) -> Result<Sheet> {
    let worksheet = read_worksheets(path)?
        .into_iter()
        .next()
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("'{}' has no worksheet", path.display())))?;
    Ok(worksheet_to_sheet(&worksheet, id))
}

/// Reads only the column titles of the first worksheet.
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let worksheet = read_worksheets(path)?
        .into_iter()
        .next()
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("'{}' has no worksheet", path.display())))?;
    Ok(header_columns(&worksheet)
        .into_iter()
        .map(|column| column.title)
        .collect())
}

pub(crate) fn worksheet_to_sheet(worksheet: &WorksheetData, id: &SheetId) -> Sheet {
    let columns = header_columns(worksheet);
    let (_, first_column) = worksheet.origin;

    let rows = worksheet
        .rows
        .iter()
        .skip(1)
        .map(|row| SheetRow {
            cells: row
                .iter()
                .enumerate()
                .filter_map(|(index, cell)| {
                    let value = cell_to_value(cell);
                    (!value.is_empty()).then(|| Cell {
                        column_id: u64::from(first_column) + index as u64,
                        value,
                    })
                })
                .collect(),
        })
        .filter(|row| !row.cells.is_empty())
        .collect();

    Sheet {
        id: id.clone(),
        name: worksheet.name.clone(),
        columns,
        rows,
    }
}

fn header_columns(worksheet: &WorksheetData) -> Vec<Column> {
    let (_, first_column) = worksheet.origin;
    match worksheet.rows.first() {
        Some(header) => header
            .iter()
            .enumerate()
            .filter_map(|(index, cell)| {
                let title = cell_to_value(cell).raw_text().trim().to_string();
                (!title.is_empty()).then(|| Column {
                    id: u64::from(first_column) + index as u64,
                    title,
                })
            })
            .collect(),
        None => Vec::new(),
    }
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// Converts a calamine cell into a scalar. Date cells become ISO text so that
/// raw comparisons order them chronologically.
pub fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Boolean(*value),
        DataType::DateTime(serial) => excel_serial_to_text(*serial)
            .map(CellValue::Text)
            .unwrap_or(CellValue::Number(*serial)),
        DataType::Empty => CellValue::Empty,
        DataType::Error(_) => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

/// Last serial Excel can represent (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Renders an Excel date serial (1900 system) as `YYYY-MM-DD`, with a time
/// component only when the serial carries one.
pub fn excel_serial_to_text(serial: f64) -> Option<String> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    let datetime = epoch
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))?;
    if seconds == 0 {
        Some(datetime.format("%Y-%m-%d").to_string())
    } else {
        Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}
