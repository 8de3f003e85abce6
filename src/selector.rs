//! File selection
//!
//! First of the two pipeline phases: every candidate file is opened, probed
//! with the normalizer and closed again. Only the path list survives; the
//! assembler reopens the files it is given.

use crate::config::Domain;
use crate::data_source::ObsSource;
use crate::errors::{ObsPackError, Result};
use crate::netcdf_io::SourceFile;
use crate::normalize::normalize;
use glob::Pattern;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-name prefix of sources that are never used
pub const EXCLUDED_PREFIX: &str = "obspack_ch4";

/// Suffix of candidate files
pub const DATA_FILE_SUFFIX: &str = "*.nc";

/// Outcome of the selection phase
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Accepted files, sorted lexicographically
    pub files: Vec<PathBuf>,
    /// Accepted files per `dataset_project`
    pub platforms: BTreeMap<String, usize>,
    /// Files left out by name
    pub excluded: usize,
    /// Files missing a required variable or attribute
    pub skipped_schema: usize,
    /// Files with no record inside the domain
    pub skipped_empty: usize,
    /// Files that could not be opened or read
    pub skipped_unreadable: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped_schema + self.skipped_empty + self.skipped_unreadable
    }
}

enum Probe {
    Accepted { project: String },
    Empty,
}

/// Whether a file name is eligible at all
pub fn is_candidate_name(file_name: &str) -> bool {
    file_name.ends_with(".nc") && !file_name.starts_with(EXCLUDED_PREFIX)
}

/// Candidate `*.nc` files in `dir`, excluded names removed, sorted.
///
/// Also returns how many files were excluded by name.
pub fn candidate_files(dir: &Path) -> Result<(Vec<PathBuf>, usize)> {
    if !dir.is_dir() {
        return Err(ObsPackError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let escaped = Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped).join(DATA_FILE_SUFFIX);
    let mut files = Vec::new();
    let mut excluded = 0;
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let path = entry?;
        let eligible = path
            .file_name()
            .map(|name| is_candidate_name(&name.to_string_lossy()))
            .unwrap_or(false);
        if eligible {
            files.push(path);
        } else {
            excluded += 1;
        }
    }
    files.sort();
    Ok((files, excluded))
}

/// Selects the files in `dir` that contribute at least one record to
/// `domain`.
///
/// Per-file failures are logged and counted; only a missing directory or an
/// unlistable entry is fatal.
pub fn select_files(dir: &Path, domain: &Domain) -> Result<Selection> {
    let (candidates, excluded) = candidate_files(dir)?;
    info!("{} candidate files in {}", candidates.len(), dir.display());
    info!("Checking files");

    let mut selection = Selection {
        excluded,
        ..Selection::default()
    };
    for path in candidates {
        match probe(&path, domain) {
            Ok(Probe::Accepted { project }) => {
                debug!("Accepted {} ({})", path.display(), project);
                *selection.platforms.entry(project).or_insert(0) += 1;
                selection.files.push(path);
            }
            Ok(Probe::Empty) => {
                debug!("No records in domain: {}", path.display());
                selection.skipped_empty += 1;
            }
            Err(e) if e.is_schema_error() => {
                info!("Skipping {}: {}", path.display(), e);
                selection.skipped_schema += 1;
            }
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                selection.skipped_unreadable += 1;
            }
        }
    }

    for (project, count) in &selection.platforms {
        info!("  {}: {} files", project, count);
    }
    info!(
        "Selected {} files ({} skipped, {} excluded by name)",
        selection.files.len(),
        selection.skipped(),
        selection.excluded
    );
    Ok(selection)
}

fn probe(path: &Path, domain: &Domain) -> Result<Probe> {
    let source = SourceFile::open(path)?;
    let normalized = normalize(&source, domain)?;
    if normalized.is_empty() {
        return Ok(Probe::Empty);
    }
    let project = normalized.string_attribute("dataset_project")?;
    debug!("{}: {} records", source.source_name(), normalized.len());
    Ok(Probe::Accepted { project })
}
