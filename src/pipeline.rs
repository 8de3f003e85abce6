//! Top-level orchestration: select, assemble, then one daily file per day.

use crate::assembler::assemble;
use crate::config::Config;
use crate::errors::Result;
use crate::partition::save_day;
use crate::selector::{select_files, Selection};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// What a run produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub selection: Selection,
    /// Records in the assembled dataset
    pub records: usize,
    /// Daily files written, in date order
    pub written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn files_selected(&self) -> usize {
        self.selection.files.len()
    }
}

/// Runs the whole pipeline for `config`.
pub fn run(config: &Config) -> Result<RunSummary> {
    fs::create_dir_all(&config.outdir)?;

    let domain = config.domain();
    let selection = select_files(&config.datadir, &domain)?;
    let assembled = assemble(&selection.files, &domain)?;

    let mut written = Vec::new();
    for date in config.dates() {
        if let Some(path) = save_day(&assembled, date, config)? {
            written.push(path);
        }
    }

    info!(
        "Wrote {} daily files to {}",
        written.len(),
        config.outdir.display()
    );
    Ok(RunSummary {
        selection,
        records: assembled.len(),
        written,
    })
}
