use std::path::PathBuf;

use thiserror::Error;

use crate::upr::mapping::model::SheetId;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the failures that abort a stage or the whole run.
///
/// Failures that only affect a single source sheet are not represented here;
/// they surface as [`SkipReason`](crate::upr::mapping::schema::SkipReason)
/// values so the remaining sheets can still be processed.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a workbook does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a sheet identifier cannot be resolved by the workspace.
    #[error("sheet '{0}' not found")]
    SheetNotFound(SheetId),

    /// Raised when the mapping configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the workspace cannot be reached at all. Fatal for the run.
    #[error("cannot connect to workspace: {0}")]
    Connectivity(String),

    /// Raised when appending to the archive fails. Not retried.
    #[error("failed to append to archive '{archive}': {reason}")]
    ArchiveWrite { archive: SheetId, reason: String },

    /// Raised when the user provides a path that does not exist.
    #[error("input path not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
