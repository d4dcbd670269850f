//! Collaborator contract for the tabular workspace plus its adapters.

pub mod excel_read;
pub mod excel_write;
pub mod excel_workspace;
pub mod memory;

use tracing::{info, warn};

use crate::upr::mapping::error::Result;
use crate::upr::mapping::model::{NewRow, Sheet, SheetId, SheetRef};

pub use excel_workspace::ExcelWorkspace;
pub use memory::MemoryWorkspace;

/// A collection of sheets that can be enumerated, read and appended to.
///
/// Every call blocks until it completes or fails. Implementations are not
/// expected to retry.
pub trait Workspace {
    /// Returns one page of sheets. Pages are numbered from 1; a page shorter
    /// than `page_size` (or empty) is the last one.
    fn list_sheets(&self, page: usize, page_size: usize) -> Result<Vec<SheetRef>>;

    /// Returns the column titles declared by a sheet.
    fn get_columns(&self, id: &SheetId) -> Result<Vec<String>> {
        let sheet = self.get_sheet(id)?;
        Ok(sheet.columns.into_iter().map(|column| column.title).collect())
    }

    /// Returns the full content of a sheet.
    fn get_sheet(&self, id: &SheetId) -> Result<Sheet>;

    /// Appends rows below the existing content and returns how many were
    /// written. A short count signals partial success.
    fn add_rows(&mut self, id: &SheetId, rows: Vec<NewRow>) -> Result<usize>;
}

/// Enumerates every sheet, following pages until a short or empty one.
///
/// A failing page stops the enumeration; the sheets gathered so far are kept.
pub fn list_all_sheets<W: Workspace + ?Sized>(workspace: &W, page_size: usize) -> Vec<SheetRef> {
    let mut sheets = Vec::new();
    let mut page = 1;
    loop {
        match workspace.list_sheets(page, page_size) {
            Ok(batch) => {
                let last = batch.len() < page_size;
                sheets.extend(batch);
                if last {
                    break;
                }
                page += 1;
            }
            Err(error) => {
                warn!(page, %error, "failed to list sheets; keeping earlier pages");
                break;
            }
        }
    }
    info!(sheet_count = sheets.len(), "enumerated workspace sheets");
    sheets
}
