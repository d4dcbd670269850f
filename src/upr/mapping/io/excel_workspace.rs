use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::upr::mapping::error::{Result, ToolError};
use crate::upr::mapping::io::Workspace;
use crate::upr::mapping::io::{excel_read, excel_write};
use crate::upr::mapping::model::{NewRow, Sheet, SheetId, SheetRef};

const WORKBOOK_EXTENSION: &str = "xlsx";

/// Workspace backed by a directory of `.xlsx` workbooks.
///
/// Each workbook contributes one sheet: its first worksheet. The file stem is
/// both the sheet id and its name. Appending rewrites the workbook with every
/// worksheet preserved by value; cell styling other than date formats is not
/// carried over.
#[derive(Debug, Clone)]
pub struct ExcelWorkspace {
    root: PathBuf,
}

impl ExcelWorkspace {
    /// Opens a workspace directory. A missing or unreadable directory is a
    /// connectivity failure.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ToolError::Connectivity(format!(
                "workspace directory '{}' not found",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the workbook holding the given sheet.
    pub fn workbook_path(&self, id: &SheetId) -> PathBuf {
        self.root.join(format!("{}.{WORKBOOK_EXTENSION}", id.as_str()))
    }

    fn existing_workbook(&self, id: &SheetId) -> Result<PathBuf> {
        let path = self.workbook_path(id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ToolError::SheetNotFound(id.clone()))
        }
    }

    fn sheet_ids(&self) -> Result<Vec<SheetId>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|error| ToolError::Connectivity(format!("{}: {error}", self.root.display())))?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_workbook = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(WORKBOOK_EXTENSION));
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            // Office lock files share the workbook extension.
            if is_workbook && !stem.starts_with("~$") {
                ids.push(SheetId::new(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl Workspace for ExcelWorkspace {
    fn list_sheets(&self, page: usize, page_size: usize) -> Result<Vec<SheetRef>> {
        let start = page.saturating_sub(1) * page_size;
        Ok(self
            .sheet_ids()?
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|id| SheetRef {
                name: id.as_str().to_string(),
                id,
            })
            .collect())
    }

    fn get_columns(&self, id: &SheetId) -> Result<Vec<String>> {
        excel_read::read_header(&self.existing_workbook(id)?)
    }

    #[instrument(level = "debug", skip(self), fields(sheet = %id))]
    fn get_sheet(&self, id: &SheetId) -> Result<Sheet> {
        let path = self.existing_workbook(id)?;
        let mut sheet = excel_read::read_sheet(&path, id)?;
        sheet.name = id.as_str().to_string();
        debug!(row_count = sheet.rows.len(), "sheet read");
        Ok(sheet)
    }

    #[instrument(level = "debug", skip(self, rows), fields(sheet = %id, row_count = rows.len()))]
    fn add_rows(&mut self, id: &SheetId, rows: Vec<NewRow>) -> Result<usize> {
        let path = self.existing_workbook(id)?;
        let mut worksheets = excel_read::read_worksheets(&path)?;
        let target = worksheets.first_mut().ok_or_else(|| {
            ToolError::InvalidWorkbook(format!("'{}' has no worksheet", path.display()))
        })?;
        excel_write::append_rows(target, &rows)?;
        excel_write::write_worksheets(&path, &worksheets)?;
        debug!("workbook rewritten");
        Ok(rows.len())
    }
}
