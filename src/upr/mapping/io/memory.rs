use std::cell::RefCell;
use std::collections::HashSet;

use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::io::Workspace;
use crate::upr::mapping::model::{Cell, Column, NewRow, Row, Sheet, SheetId, SheetRef, SheetRow};

/// In-memory workspace with injectable failures. Reads are recorded so
/// callers can assert which sheets were touched.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    sheets: Vec<Sheet>,
    failing_columns: HashSet<SheetId>,
    failing_reads: HashSet<SheetId>,
    failing_writes: HashSet<SheetId>,
    write_limit: Option<usize>,
    failing_page: Option<usize>,
    reads: RefCell<Vec<SheetId>>,
    pages: RefCell<Vec<usize>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sheet whose columns get ids in declaration order. Row values
    /// keyed by an undeclared column are kept under an unknown column id.
    pub fn insert_sheet(&mut self, sheet: SheetRef, columns: &[&str], rows: Vec<Row>) {
        let columns: Vec<Column> = columns
            .iter()
            .enumerate()
            .map(|(index, title)| Column {
                id: index as u64 + 1,
                title: title.to_string(),
            })
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| SheetRow {
                cells: row
                    .into_iter()
                    .map(|(name, value)| Cell {
                        column_id: columns
                            .iter()
                            .find(|column| column.title == name)
                            .map(|column| column.id)
                            .unwrap_or(u64::MAX),
                        value,
                    })
                    .collect(),
            })
            .collect();
        self.insert_raw_sheet(Sheet {
            id: sheet.id,
            name: sheet.name,
            columns,
            rows,
        });
    }

    /// Adds or replaces a fully specified sheet.
    pub fn insert_raw_sheet(&mut self, sheet: Sheet) {
        self.sheets.retain(|existing| existing.id != sheet.id);
        self.sheets.push(sheet);
    }

    pub fn sheet(&self, id: &SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| &sheet.id == id)
    }

    /// Makes schema reads of the given sheet fail.
    pub fn fail_columns(&mut self, id: impl Into<SheetId>) {
        self.failing_columns.insert(id.into());
    }

    /// Makes full reads of the given sheet fail.
    pub fn fail_reads(&mut self, id: impl Into<SheetId>) {
        self.failing_reads.insert(id.into());
    }

    /// Makes appends to the given sheet fail.
    pub fn fail_writes(&mut self, id: impl Into<SheetId>) {
        self.failing_writes.insert(id.into());
    }

    /// Caps how many rows a single append writes.
    pub fn limit_writes(&mut self, limit: usize) {
        self.write_limit = Some(limit);
    }

    /// Makes listing fail from the given page onwards.
    pub fn fail_listing_from_page(&mut self, page: usize) {
        self.failing_page = Some(page);
    }

    /// Sheets read through [`Workspace::get_sheet`], in call order.
    pub fn reads(&self) -> Vec<SheetId> {
        self.reads.borrow().clone()
    }

    pub fn listed_pages(&self) -> Vec<usize> {
        self.pages.borrow().clone()
    }

    fn find(&self, id: &SheetId) -> Result<&Sheet> {
        self.sheet(id).ok_or_else(|| ToolError::SheetNotFound(id.clone()))
    }
}

impl Workspace for MemoryWorkspace {
    fn list_sheets(&self, page: usize, page_size: usize) -> Result<Vec<SheetRef>> {
        self.pages.borrow_mut().push(page);
        if self.failing_page.is_some_and(|failing| page >= failing) {
            return Err(ToolError::Connectivity(format!("page {page} unavailable")));
        }
        let start = page.saturating_sub(1) * page_size;
        Ok(self
            .sheets
            .iter()
            .skip(start)
            .take(page_size)
            .map(|sheet| SheetRef {
                id: sheet.id.clone(),
                name: sheet.name.clone(),
            })
            .collect())
    }

    fn get_columns(&self, id: &SheetId) -> Result<Vec<String>> {
        if self.failing_columns.contains(id) {
            return Err(ToolError::InvalidWorkbook(format!("columns of '{id}' unreadable")));
        }
        let sheet = self.find(id)?;
        Ok(sheet.columns.iter().map(|column| column.title.clone()).collect())
    }

    fn get_sheet(&self, id: &SheetId) -> Result<Sheet> {
        self.reads.borrow_mut().push(id.clone());
        if self.failing_reads.contains(id) {
            return Err(ToolError::InvalidWorkbook(format!("sheet '{id}' unreadable")));
        }
        self.find(id).cloned()
    }

    fn add_rows(&mut self, id: &SheetId, rows: Vec<NewRow>) -> Result<usize> {
        if self.failing_writes.contains(id) {
            return Err(ToolError::ArchiveWrite {
                archive: id.clone(),
                reason: "write rejected".into(),
            });
        }
        let limit = self.write_limit.unwrap_or(usize::MAX);
        let sheet = self
            .sheets
            .iter_mut()
            .find(|sheet| &sheet.id == id)
            .ok_or_else(|| ToolError::SheetNotFound(id.clone()))?;
        let written = rows.len().min(limit);
        sheet.rows.extend(rows.into_iter().take(written));
        Ok(written)
    }
}
