use tracing::{info, instrument};

use crate::upr::mapping::io::Workspace;
use crate::upr::mapping::model::{Row, Sheet, SheetRef};
use crate::upr::mapping::schema::{SkipReason, Skipped};

/// Reads every row of a sheet, resolving cells to column names.
#[instrument(level = "info", skip(workspace), fields(sheet = %sheet.name, id = %sheet.id))]
pub fn extract_rows<W: Workspace + ?Sized>(
    workspace: &W,
    sheet: &SheetRef,
) -> std::result::Result<Vec<Row>, Skipped> {
    let content = workspace.get_sheet(&sheet.id).map_err(|error| Skipped {
        sheet: sheet.clone(),
        reason: SkipReason::RowsUnreadable {
            error: error.to_string(),
        },
    })?;
    let rows = resolve_rows(&content);
    info!(row_count = rows.len(), "rows extracted");
    Ok(rows)
}

/// Maps each cell through the sheet's column-id → title table. Cells whose
/// column is unknown are dropped.
pub fn resolve_rows(sheet: &Sheet) -> Vec<Row> {
    let titles = sheet.column_titles_by_id();
    sheet
        .rows
        .iter()
        .map(|row| {
            row.cells
                .iter()
                .filter_map(|cell| {
                    titles
                        .get(&cell.column_id)
                        .map(|title| (title.to_string(), cell.value.clone()))
                })
                .collect()
        })
        .collect()
}
