use std::path::Path;

use calamine::DataType;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::io::excel_read::WorksheetData;
use crate::upr::mapping::model::{CellValue, NewRow};

const DATE_FORMAT: &str = "yyyy-mm-dd";

/// Writes the provided worksheets to the given path, replacing the file.
pub fn write_worksheets(path: &Path, worksheets: &[WorksheetData]) -> Result<()> {
    let mut workbook_writer = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);

    for data in worksheets {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&data.name)?;

        let (first_row, first_column) = data.origin;
        for (row_idx, row) in data.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                let row_number = first_row + row_idx as u32;
                let col_number = column_number(u64::from(first_column) + col_idx as u64)?;
                write_cell(worksheet, row_number, col_number, cell, &date_format)?;
            }
        }
    }

    workbook_writer.save(path)?;
    Ok(())
}

/// Places new rows below the last used row of the worksheet. Column ids are
/// absolute column indexes.
pub fn append_rows(worksheet: &mut WorksheetData, rows: &[NewRow]) -> Result<()> {
    let (_, first_column) = worksheet.origin;
    for row in rows {
        let mut cells: Vec<DataType> = Vec::new();
        for cell in &row.cells {
            let offset = cell
                .column_id
                .checked_sub(u64::from(first_column))
                .ok_or_else(|| {
                    ToolError::InvalidWorkbook(format!(
                        "column {} lies left of the worksheet origin",
                        cell.column_id
                    ))
                })? as usize;
            if cells.len() <= offset {
                cells.resize(offset + 1, DataType::Empty);
            }
            cells[offset] = value_to_cell(&cell.value);
        }
        worksheet.rows.push(cells);
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &DataType,
    date_format: &Format,
) -> Result<()> {
    match cell {
        DataType::Empty => {}
        DataType::String(value) => {
            worksheet.write_string(row, col, value)?;
        }
        DataType::Float(value) => {
            worksheet.write_number(row, col, *value)?;
        }
        DataType::Int(value) => {
            worksheet.write_number(row, col, *value as f64)?;
        }
        DataType::Bool(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        DataType::DateTime(serial) => {
            worksheet.write_number_with_format(row, col, *serial, date_format)?;
        }
        other => {
            worksheet.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

fn value_to_cell(value: &CellValue) -> DataType {
    match value {
        CellValue::Text(text) => DataType::String(text.clone()),
        CellValue::Number(number) => DataType::Float(*number),
        CellValue::Boolean(flag) => DataType::Bool(*flag),
        CellValue::Empty => DataType::Empty,
    }
}

fn column_number(column: u64) -> Result<u16> {
    u16::try_from(column)
        .map_err(|_| ToolError::InvalidWorkbook(format!("column index {column} out of range")))
}
