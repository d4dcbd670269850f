use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use upr_report_mapping::config::MappingConfig;
use upr_report_mapping::io::{ExcelWorkspace, list_all_sheets};
use upr_report_mapping::model::SheetId;
use upr_report_mapping::pipeline::Pipeline;
use upr_report_mapping::schema::{ReferenceSchema, match_sheets};
use upr_report_mapping::{Result, ToolError};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => execute_run(args),
        Command::Sources(args) => execute_sources(args),
    }
}

fn execute_run(args: RunArgs) -> Result<()> {
    let config = args.common.resolve_config(args.archive, args.dry_run)?;
    let mut workspace = ExcelWorkspace::open(&args.common.workspace)?;

    let report = Pipeline::new(&mut workspace, &config).run()?;
    info!(outcome = ?report.outcome, new_records = report.new_records.len(), "run finished");

    if let Some(path) = args.report {
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), "report written");
    }
    match report.write_error {
        Some(reason) => Err(ToolError::ArchiveWrite {
            archive: config.archive_sheet,
            reason,
        }),
        None => Ok(()),
    }
}

fn execute_sources(args: CommonArgs) -> Result<()> {
    let config = args.resolve_config(None, false)?;
    let workspace = ExcelWorkspace::open(&args.workspace)?;

    let reference = ReferenceSchema::load(&workspace, &config.reference_sheet)?;
    let candidates = list_all_sheets(&workspace, config.page_size);
    let matched = match_sheets(&workspace, &reference, &candidates)
        .into_iter()
        .filter(|result| result.is_ok())
        .count();
    info!(matched, listed = candidates.len(), "schema check finished");
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Consolidate weekly revenue line items into a deduplicated archive."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full reconciliation and append new records to the archive.
    Run(RunArgs),
    /// Only report which sheets match the reference schema.
    Sources(CommonArgs),
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Directory holding one `.xlsx` workbook per sheet.
    #[arg(long)]
    workspace: PathBuf,

    /// JSON configuration file. Defaults apply to any field it omits.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sheet whose columns define the required schema.
    #[arg(long)]
    reference: Option<String>,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Sheet accumulating the consolidated records.
    #[arg(long)]
    archive: Option<String>,

    /// Report what would be appended without touching the archive.
    #[arg(long)]
    dry_run: bool,

    /// Write the run report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

impl CommonArgs {
    fn resolve_config(&self, archive: Option<String>, dry_run: bool) -> Result<MappingConfig> {
        let mut config = match &self.config {
            Some(path) => MappingConfig::load(path)?,
            None => MappingConfig::default(),
        };
        if let Some(reference) = &self.reference {
            config.reference_sheet = SheetId::new(reference.as_str());
        }
        if let Some(archive) = archive {
            config.archive_sheet = SheetId::new(archive);
        }
        config.dry_run |= dry_run;
        config.validate()?;
        Ok(config)
    }
}
