//! Run configuration
//!
//! The settings document is a flat YAML mapping:
//!
//! ```yaml
//! datadir: /data/obspack_co2/data/nc
//! outdir: /scratch/obs_daily
//! outfile_name_stem: obspack_co2_%Y%m%d.nc
//! start_time: 2019-01-01
//! end_time: 2019-01-31
//! lat_min: 10.0
//! lat_max: 80.0
//! lon_min: -170.0
//! lon_max: -50.0
//! ```

use crate::cftime::{day_end, day_start};
use crate::errors::{ObsPackError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default location of the settings document
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Settings for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned for `*.nc` source files
    pub datadir: PathBuf,
    /// Directory receiving daily files (created if absent)
    pub outdir: PathBuf,
    /// strftime template for daily file names
    pub outfile_name_stem: String,
    /// First day to produce (inclusive)
    pub start_time: NaiveDate,
    /// Last day to produce (inclusive)
    pub end_time: NaiveDate,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Config {
    /// Loads and validates a settings document
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ObsPackError::InvalidConfig(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Parses and validates a settings document held in memory
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_time > self.end_time {
            return Err(ObsPackError::InvalidConfig(format!(
                "start_time {} is after end_time {}",
                self.start_time, self.end_time
            )));
        }
        if !(self.lat_min <= self.lat_max) {
            return Err(ObsPackError::InvalidConfig(format!(
                "lat_min {} is greater than lat_max {}",
                self.lat_min, self.lat_max
            )));
        }
        if !(self.lon_min <= self.lon_max) {
            return Err(ObsPackError::InvalidConfig(format!(
                "lon_min {} is greater than lon_max {}",
                self.lon_min, self.lon_max
            )));
        }
        if self.outfile_name_stem.is_empty() {
            return Err(ObsPackError::InvalidConfig(
                "outfile_name_stem is empty".to_string(),
            ));
        }
        if StrftimeItems::new(&self.outfile_name_stem).any(|item| matches!(item, Item::Error)) {
            return Err(ObsPackError::InvalidConfig(format!(
                "outfile_name_stem '{}' is not a valid date template",
                self.outfile_name_stem
            )));
        }
        if !self.outfile_name_stem.contains('%') {
            warn!(
                "outfile_name_stem '{}' has no date placeholder; every day will overwrite the same file",
                self.outfile_name_stem
            );
        }
        Ok(())
    }

    /// Time window and spatial bounds used to filter observations
    pub fn domain(&self) -> Domain {
        Domain {
            start: self.start_time,
            end: self.end_time,
            lat_min: self.lat_min,
            lat_max: self.lat_max,
            lon_min: self.lon_min,
            lon_max: self.lon_max,
        }
    }

    /// Every calendar day from `start_time` to `end_time`, inclusive
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end_time;
        self.start_time.iter_days().take_while(move |d| *d <= end)
    }

    /// Daily file path for `date`
    pub fn output_path(&self, date: NaiveDate) -> PathBuf {
        self.outdir
            .join(date.format(&self.outfile_name_stem).to_string())
    }
}

/// Time window and lat/lon box an observation must fall in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Domain {
    /// Bounds of the time filter in epoch seconds, both inclusive.
    ///
    /// The upper bound is `end` plus one day (midnight after the last day),
    /// so records that start before midnight but are tagged at the boundary
    /// are still kept.
    pub fn time_bounds(&self) -> (i64, i64) {
        (day_start(self.start), day_end(self.end))
    }

    pub fn contains_time(&self, seconds: i64) -> bool {
        let (lower, upper) = self.time_bounds();
        (lower..=upper).contains(&seconds)
    }

    /// Inclusive on every edge; NaN coordinates never match
    pub fn contains_position(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.lat_min
            && latitude <= self.lat_max
            && longitude >= self.lon_min
            && longitude <= self.lon_max
    }
}
