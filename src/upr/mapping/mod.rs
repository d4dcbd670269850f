pub mod archive;
pub mod config;
pub mod consolidate;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod filter;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod schema;

pub use error::{Result, ToolError};
