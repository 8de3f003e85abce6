//! Data source abstraction for observation inputs
//!
//! The normalizer only needs to know which variables a source has, load the
//! ones it asks for, and read global attributes. Keeping that behind a trait
//! lets a netCDF file be probed without loading every variable, and lets the
//! same normalization run against an in-memory [`Dataset`].

use crate::dataset::{Attributes, Dataset, Variable};
use crate::errors::{ObsPackError, Result};

/// Read access to one observation source
pub trait ObsSource {
    /// Human-readable name used in log messages (usually a file path)
    fn source_name(&self) -> String;

    /// Whether the source holds a variable called `name`
    fn has_variable(&self, name: &str) -> bool;

    /// Loads a single variable
    fn load_variable(&self, name: &str) -> Result<Variable>;

    /// Global (file-level) attributes
    fn global_attributes(&self) -> Result<Attributes>;

    /// Loads the named variables and global attributes into a dataset
    fn load(&self, names: &[&str]) -> Result<Dataset> {
        let mut ds = Dataset::new();
        ds.attributes = self.global_attributes()?;
        for name in names {
            ds.insert(self.load_variable(name)?)?;
        }
        Ok(ds)
    }
}

impl ObsSource for Dataset {
    fn source_name(&self) -> String {
        self.attribute("dataset_name")
            .and_then(crate::dataset::attribute_to_string)
            .unwrap_or_else(|| "<in-memory dataset>".to_string())
    }

    fn has_variable(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn load_variable(&self, name: &str) -> Result<Variable> {
        self.variable(name)
            .cloned()
            .ok_or_else(|| ObsPackError::variable_not_found(name))
    }

    fn global_attributes(&self) -> Result<Attributes> {
        Ok(self.attributes.clone())
    }
}
