//! Daily partitioning
//!
//! Splits the assembled dataset into one file per calendar day. A day's file
//! holds the records with `day_start <= time < day_end` and a valid sampling
//! strategy, with fixed text widths and explicit fill values.

use crate::assembler::{AssembledDataset, STRATEGY_VAR};
use crate::cftime::{day_end, day_start};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::netcdf_io::DailyWriter;
use crate::sampling::{self, is_valid_code};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, info};

/// Fill value of the floating observation fields
pub const FLOAT_FILL: f64 = -1e34;

/// Fixed byte widths of the text fields
pub const CHAR_WIDTHS: [(&str, usize); 3] = [("obspack_id", 200), ("platform", 50), ("qcflag", 10)];

/// Explicit `_FillValue` per field
pub const FILL_VALUES: [(&str, f64); 6] = [
    ("time_components", -9.0),
    ("value", FLOAT_FILL),
    ("latitude", FLOAT_FILL),
    ("longitude", FLOAT_FILL),
    ("altitude", FLOAT_FILL),
    (STRATEGY_VAR, sampling::FILL_VALUE as f64),
];

/// Records of `assembled` belonging to `date`
pub fn select_day(assembled: &AssembledDataset, date: NaiveDate) -> Result<Dataset> {
    let window = assembled.time_window(day_start(date), day_end(date))?;
    if window.is_empty() {
        return Ok(window);
    }
    let mask: Vec<bool> = window
        .require(STRATEGY_VAR)?
        .to_f64()?
        .iter()
        .map(|&code| code.fract() == 0.0 && is_valid_code(code as i64))
        .collect();
    window.filter(&mask)
}

/// Applies the daily-file text widths and fill values
pub fn apply_daily_encoding(day: &mut Dataset) {
    for (name, width) in CHAR_WIDTHS {
        if let Some(var) = day.variable_mut(name) {
            var.encoding.char_width = Some(width);
        }
    }
    for (name, fill) in FILL_VALUES {
        if let Some(var) = day.variable_mut(name) {
            var.encoding.fill_value = Some(fill);
        }
    }
}

/// Writes the daily file for `date`.
///
/// Returns the written path, or `None` when the day has no qualifying
/// records and nothing was written.
pub fn save_day(
    assembled: &AssembledDataset,
    date: NaiveDate,
    config: &Config,
) -> Result<Option<PathBuf>> {
    let mut day = select_day(assembled, date)?;
    if day.is_empty() {
        debug!("No records for {}", date);
        return Ok(None);
    }
    apply_daily_encoding(&mut day);

    let path = config.output_path(date);
    info!("Saving {}", date.format("%Y-%m-%d"));
    DailyWriter::new(&day, &path).write()?;
    debug!("{} records written to {}", day.len(), path.display());
    Ok(Some(path))
}
