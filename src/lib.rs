//! obspack_daily: ObsPack observations re-packaged as daily netCDF files
//!
//! Reads a directory of ObsPack-format netCDF files, keeps the observations
//! inside a configured time window and lat/lon box, classifies each record's
//! averaging window into a transport-model sampling strategy and writes one
//! compressed netCDF file per calendar day.
//!
//! ## Module Organization
//!
//! - [`config`]: YAML settings document and the filtering domain
//! - [`normalize`]: per-file schema normalization and domain filtering
//! - [`selector`]: probing candidate files (first phase)
//! - [`assembler`]: reopening and concatenating selected files (second phase)
//! - [`sampling`]: sampling-strategy ladder
//! - [`partition`]: daily subsets and their on-disk encoding
//! - [`pipeline`]: the full run
//! - [`netcdf_io`]: reading source files and writing daily files
//! - [`dataset`]: in-memory observation arrays
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use obspack_daily::prelude::*;
//!
//! let config = Config::from_file("config.yml").unwrap();
//! let summary = obspack_daily::pipeline::run(&config).unwrap();
//! println!("{} daily files written", summary.written.len());
//! ```

pub mod assembler;
pub mod cftime;
pub mod cli;
pub mod config;
pub mod data_source;
pub mod dataset;
pub mod errors;
pub mod logging;
pub mod netcdf_io;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod sampling;
pub mod selector;

pub use errors::{ObsPackError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::assembler::{assemble, AssembledDataset, Segment};
    pub use crate::config::{Config, Domain};
    pub use crate::data_source::ObsSource;
    pub use crate::dataset::{Dataset, VarData, Variable};
    pub use crate::errors::{ObsPackError, Result};
    pub use crate::netcdf_io::{DailyWriter, SourceFile};
    pub use crate::normalize::normalize;
    pub use crate::partition::save_day;
    pub use crate::pipeline::{run, RunSummary};
    pub use crate::sampling::SamplingStrategy;
    pub use crate::selector::{select_files, Selection};
}
