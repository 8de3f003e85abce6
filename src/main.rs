//! Entry point for obspack_daily.
//! Parses arguments, sets up logging, loads the settings document and runs the pipeline.

use anyhow::Context;
use clap::Parser;
use obspack_daily::cli::Args;
use obspack_daily::config::Config;
use obspack_daily::logging::init_logging;
use obspack_daily::pipeline;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    info!(
        "Processing {} to {} from {}",
        config.start_time,
        config.end_time,
        config.datadir.display()
    );

    let summary = pipeline::run(&config).context("daily partitioning failed")?;
    info!(
        "Done: {} files selected, {} records, {} daily files",
        summary.files_selected(),
        summary.records,
        summary.written.len()
    );
    Ok(())
}
