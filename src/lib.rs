//! Core library for the upr-report-mapping command line application.
//!
//! The library consolidates weekly revenue line items spread across many
//! sheets into a deduplicated archive. The stages are kept narrow and
//! composable: workspace adapters live under [`upr::mapping::io`], the shared
//! data representations inside [`upr::mapping::model`], one module per
//! pipeline stage (`schema`, `extract`, `filter`, `consolidate`, `dedup`,
//! `archive`), and the orchestration under [`upr::mapping::pipeline`].

pub mod upr;

pub use upr::mapping::{
    Result, ToolError, archive, config, consolidate, dedup, error, extract, filter, io, model,
    pipeline, schema,
};
