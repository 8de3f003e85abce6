//! Dataset assembly
//!
//! Second pipeline phase: the selected files are reopened, normalized one by
//! one and given their sampling-strategy code. Each file becomes a
//! [`Segment`] that remembers only its path, record count and time range; its
//! records are read again when a time window overlapping it is requested.
//!
//! The variable layout of the whole concatenation (names, order, storage
//! kinds, attributes) is fixed once while assembling, and every window is
//! conformed to it. A day served by a single source therefore has the same
//! layout as any other day.

use crate::config::Domain;
use crate::data_source::ObsSource;
use crate::dataset::{Dataset, Variable};
use crate::errors::Result;
use crate::netcdf_io::SourceFile;
use crate::normalize::normalize;
use crate::sampling::{self, obs_length_hours, strategy_code};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the derived strategy field
pub const STRATEGY_VAR: &str = "CT_sampling_strategy";

/// Helper fields used for classification and dropped afterwards
pub const HELPER_VARIABLES: [&str; 3] = ["obs_length", "start_time", "midpoint_time"];

#[derive(Debug, Clone)]
enum Records {
    /// Reopened and normalized on every read
    File(PathBuf),
    /// Already prepared and held in memory
    Resident(Dataset),
}

/// One normalized source
#[derive(Debug, Clone)]
pub struct Segment {
    /// Where the records came from (path or dataset name)
    pub source: String,
    records: Records,
    len: usize,
    /// Smallest and largest `time`, inclusive
    pub time_range: Option<(i64, i64)>,
}

impl Segment {
    fn new(source: String, records: Records, len: usize, time_range: Option<(i64, i64)>) -> Self {
        Self {
            source,
            records,
            len,
            time_range,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the records are held in memory rather than reread from disk
    pub fn is_resident(&self) -> bool {
        matches!(self.records, Records::Resident(_))
    }

    /// Whether any record may fall in `[lower, upper)`
    pub fn overlaps(&self, lower: i64, upper: i64) -> bool {
        match self.time_range {
            Some((first, last)) => first < upper && last >= lower,
            None => false,
        }
    }

    fn load(&self, domain: &Domain) -> Result<Option<Dataset>> {
        match &self.records {
            Records::Resident(data) => Ok(Some(data.clone())),
            Records::File(path) => prepare_source(&SourceFile::open(path)?, domain),
        }
    }
}

/// Virtual concatenation of every accepted source along `obs`
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    domain: Domain,
    segments: Vec<Segment>,
    /// Zero-record dataset carrying the layout of the concatenation
    schema: Option<Dataset>,
}

impl AssembledDataset {
    /// Empty assembly; file-backed segments are reread through `domain`
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            segments: Vec::new(),
            schema: None,
        }
    }

    /// Opens and prepares `path`, keeping only its bookkeeping.
    ///
    /// Returns `false` when no record of the file falls in the domain.
    pub fn push_file<P: AsRef<Path>>(&mut self, path: P) -> Result<bool> {
        let path = path.as_ref();
        let source = SourceFile::open(path)?;
        let data = match prepare_source(&source, &self.domain)? {
            Some(data) => data,
            None => return Ok(false),
        };
        let segment = Segment::new(
            source.source_name(),
            Records::File(path.to_path_buf()),
            data.len(),
            time_range(&data)?,
        );
        debug!("{}: {} records", segment.source, segment.len());
        self.merge_schema(&data)?;
        self.segments.push(segment);
        Ok(true)
    }

    /// Prepares an in-memory source and keeps its records resident
    pub fn push_source<S: ObsSource + ?Sized>(&mut self, source: &S) -> Result<bool> {
        match prepare_source(source, &self.domain)? {
            Some(data) => {
                self.push_dataset(source.source_name(), data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Adds records that are already normalized and classified
    pub fn push_dataset(&mut self, source: String, data: Dataset) -> Result<()> {
        self.merge_schema(&data)?;
        let (len, range) = (data.len(), time_range(&data)?);
        self.segments
            .push(Segment::new(source, Records::Resident(data), len, range));
        Ok(())
    }

    fn merge_schema(&mut self, data: &Dataset) -> Result<()> {
        let empty = data.take(&[]);
        self.schema = Some(match self.schema.take() {
            Some(schema) => Dataset::concat(&[schema, empty])?,
            None => empty,
        });
        Ok(())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variable names of the concatenation in first-seen order
    pub fn variable_names(&self) -> Vec<&str> {
        self.schema
            .as_ref()
            .map(Dataset::variable_names)
            .unwrap_or_default()
    }

    /// Records with `lower <= time < upper`, concatenated in segment order.
    ///
    /// Only segments whose time range overlaps the window are read. The
    /// result always carries the full variable layout of the assembly.
    pub fn time_window(&self, lower: i64, upper: i64) -> Result<Dataset> {
        let mut parts: Vec<Dataset> = self.schema.iter().cloned().collect();
        for segment in self.segments.iter().filter(|s| s.overlaps(lower, upper)) {
            let data = match segment.load(&self.domain)? {
                Some(data) => data,
                None => {
                    warn!("{}: no records in domain on reread", segment.source);
                    continue;
                }
            };
            let times = data.require("time")?.to_epoch_seconds()?;
            let mask: Vec<bool> = times.iter().map(|t| (lower..upper).contains(t)).collect();
            let part = data.filter(&mask)?;
            if !part.is_empty() {
                parts.push(part);
            }
        }
        Dataset::concat(&parts)
    }

    /// Materializes the whole concatenation
    pub fn to_dataset(&self) -> Result<Dataset> {
        let mut parts: Vec<Dataset> = self.schema.iter().cloned().collect();
        for segment in &self.segments {
            if let Some(data) = segment.load(&self.domain)? {
                parts.push(data);
            }
        }
        Dataset::concat(&parts)
    }
}

/// Smallest and largest `time` of `data`
fn time_range(data: &Dataset) -> Result<Option<(i64, i64)>> {
    let times = match data.variable("time") {
        Some(var) => var.to_epoch_seconds()?,
        None => Vec::new(),
    };
    Ok(times.iter().min().copied().zip(times.iter().max().copied()))
}

/// Adds `CT_sampling_strategy` from `start_time`/`midpoint_time`, then drops
/// the helper fields.
pub fn derive_sampling_strategy(data: &mut Dataset) -> Result<()> {
    let starts = data.require("start_time")?.to_epoch_seconds()?;
    let midpoints = data.require("midpoint_time")?.to_epoch_seconds()?;
    let obs_length: Vec<f64> = starts
        .iter()
        .zip(&midpoints)
        .map(|(&start, &mid)| obs_length_hours(start, mid))
        .collect();
    let codes: Vec<i64> = obs_length.iter().map(|&hours| strategy_code(hours)).collect();

    data.insert(Variable::float("obs_length", obs_length))?;

    let mut strategy = Variable::int(STRATEGY_VAR, codes)
        .with_attribute("long_name", sampling::LONG_NAME)
        .with_attribute("values", sampling::VALUES_DESCRIPTION);
    strategy.encoding.fill_value = Some(sampling::FILL_VALUE as f64);
    data.insert(strategy)?;

    data.drop_variables(&HELPER_VARIABLES);
    Ok(())
}

/// Normalizes and classifies one source; `None` when nothing survives the
/// domain filter.
pub fn prepare_source<S: ObsSource + ?Sized>(source: &S, domain: &Domain) -> Result<Option<Dataset>> {
    let mut data = normalize(source, domain)?;
    if data.is_empty() {
        return Ok(None);
    }
    derive_sampling_strategy(&mut data)?;
    data.clear_attributes();
    Ok(Some(data))
}

/// Reopens every selected file and builds the assembled dataset.
///
/// Files were already probed by the selector, so any failure here is fatal.
pub fn assemble<P: AsRef<Path>>(files: &[P], domain: &Domain) -> Result<AssembledDataset> {
    info!("Opening all files");
    let mut assembled = AssembledDataset::new(*domain);
    for path in files {
        let path = path.as_ref();
        if !assembled.push_file(path)? {
            debug!("{}: no records in domain", path.display());
        }
    }
    info!(
        "Assembled {} records from {} files",
        assembled.len(),
        assembled.segments().len()
    );
    Ok(assembled)
}
