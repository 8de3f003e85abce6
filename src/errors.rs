//! Centralized error handling for obspack_daily
//!
//! Per-file problems (a missing variable, a missing attribute) surface as
//! schema errors that the file selector treats as "skip this file". Everything
//! else is fatal to the run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for obspack_daily operations
#[derive(Error, Debug)]
pub enum ObsPackError {
    /// NetCDF library errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Settings document could not be parsed
    #[error("Configuration parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Settings document parsed but holds unusable values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bad glob pattern built from the data directory
    #[error("Invalid file pattern: {0}")]
    PatternError(#[from] glob::PatternError),

    /// Directory entry could not be read while listing candidates
    #[error("Could not list candidate file: {0}")]
    GlobError(#[from] glob::GlobError),

    /// Data directory is missing or not a directory
    #[error("Data directory '{}' does not exist", path.display())]
    DirectoryNotFound { path: PathBuf },

    /// Variable not found in a source
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// Global attribute not found in a source
    #[error("Attribute '{attr}' not found in file")]
    AttributeNotFound { attr: String },

    /// Attribute present but of an unusable type or value
    #[error("Attribute '{attr}' is invalid: {message}")]
    InvalidAttribute { attr: String, message: String },

    /// Time variable with units that are not "<unit> since <reference>"
    #[error("Variable '{var}' has unsupported time units '{units}'")]
    InvalidTimeUnits { var: String, units: String },

    /// Variable shapes or kinds that cannot be combined
    #[error("Shape mismatch for variable '{var}': {message}")]
    ShapeMismatch { var: String, message: String },

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

impl ObsPackError {
    /// Whether the error means the source does not follow the expected
    /// ObsPack layout. Such files are skipped rather than aborting the run.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ObsPackError::VariableNotFound { .. } | ObsPackError::AttributeNotFound { .. }
        )
    }

    pub(crate) fn variable_not_found<S: ToString>(var: S) -> Self {
        ObsPackError::VariableNotFound {
            var: var.to_string(),
        }
    }

    pub(crate) fn attribute_not_found<S: ToString>(attr: S) -> Self {
        ObsPackError::AttributeNotFound {
            attr: attr.to_string(),
        }
    }

    pub(crate) fn shape_mismatch<V: ToString, M: ToString>(var: V, message: M) -> Self {
        ObsPackError::ShapeMismatch {
            var: var.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for obspack_daily operations
pub type Result<T> = std::result::Result<T, ObsPackError>;
