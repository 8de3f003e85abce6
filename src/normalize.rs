//! Schema normalization of a single ObsPack source
//!
//! Every source file is reduced to the same canonical variable set, filtered
//! to the configured time window and lat/lon box, and given the derived
//! per-record fields the daily files need (`platform`, `qcflag`, `obs_flag`
//! when absent upstream, `utc_conv`).
//!
//! An empty result is a valid outcome; callers decide what to do with it.

use crate::config::Domain;
use crate::data_source::ObsSource;
use crate::dataset::{Dataset, Variable};
use crate::errors::{ObsPackError, Result};
use tracing::warn;

/// Variables kept from every source, in output order
pub const CANONICAL_VARIABLES: [&str; 12] = [
    "time",
    "start_time",
    "midpoint_time",
    "time_components",
    "value",
    "latitude",
    "longitude",
    "altitude",
    "assimilation_concerns",
    "obspack_id",
    "obs_flag",
    "qcfilter",
];

/// Canonical variables that a source may lack
pub const OPTIONAL_VARIABLES: [&str; 2] = ["qcfilter", "obs_flag"];

/// Placeholder written to `qcflag` when the source has none
pub const QCFLAG_PLACEHOLDER: &str = "...";

/// `obs_flag` value used when the source has none
pub const DEFAULT_OBS_FLAG: f64 = 1.0;

/// Platforms whose observations carry a UTC-to-local conversion
pub const LOCAL_TIME_PLATFORMS: [&str; 2] = ["surface", "tower"];

/// Variables to load from `source`: the canonical list minus optional
/// entries the source does not have.
///
/// Fails with `VariableNotFound` on the first missing required variable.
pub fn resolve_variables<S: ObsSource + ?Sized>(source: &S) -> Result<Vec<&'static str>> {
    let mut names = Vec::with_capacity(CANONICAL_VARIABLES.len());
    for name in CANONICAL_VARIABLES {
        if source.has_variable(name) {
            names.push(name);
        } else if !OPTIONAL_VARIABLES.contains(&name) {
            return Err(ObsPackError::variable_not_found(name));
        }
    }
    Ok(names)
}

/// Platform family: `dataset_project` up to its first '-'
pub fn platform_of(dataset_project: &str) -> &str {
    dataset_project
        .split('-')
        .next()
        .unwrap_or(dataset_project)
}

/// Normalizes one source against `domain`.
///
/// Schema problems (missing variables or attributes) come back as errors for
/// which [`ObsPackError::is_schema_error`] is true.
pub fn normalize<S: ObsSource + ?Sized>(source: &S, domain: &Domain) -> Result<Dataset> {
    let names = resolve_variables(source)?;
    let loaded = source.load(&names)?;

    let mask = domain_mask(&loaded, domain)?;
    let mut data = loaded.filter(&mask)?;
    let n = data.len();

    let project = data.string_attribute("dataset_project")?;
    let platform = platform_of(&project).to_string();
    data.insert(Variable::text("platform", vec![platform.clone(); n]))?;

    if !data.contains("qcflag") {
        data.insert(Variable::text("qcflag", vec![QCFLAG_PLACEHOLDER.to_string(); n]))?;
    }
    if !data.contains("obs_flag") {
        data.insert(Variable::float("obs_flag", vec![DEFAULT_OBS_FLAG; n]))?;
    }

    let utc_conv = if n > 0 && LOCAL_TIME_PLATFORMS.contains(&platform.as_str()) {
        let factor = data.numeric_attribute("site_utc2lst")?;
        if factor.trunc() != factor {
            let dataset_name = data.string_attribute("dataset_name")?;
            warn!("UTC CONVERSION FACTOR IS NOT AN INTEGER : {}", dataset_name);
        }
        factor
    } else {
        0.0
    };
    data.insert(Variable::float("utc_conv", vec![utc_conv; n]))?;

    Ok(data)
}

/// One flag per record: inside the time window and the lat/lon box
fn domain_mask(data: &Dataset, domain: &Domain) -> Result<Vec<bool>> {
    let times = data.require("time")?.to_epoch_seconds()?;
    let lats = data.require("latitude")?.to_f64()?;
    let lons = data.require("longitude")?.to_f64()?;
    if lats.len() != times.len() || lons.len() != times.len() {
        return Err(ObsPackError::shape_mismatch(
            "latitude",
            "coordinate variables differ in length from time",
        ));
    }

    Ok(times
        .iter()
        .zip(lats.iter().zip(&lons))
        .map(|(&t, (&lat, &lon))| domain.contains_time(t) && domain.contains_position(lat, lon))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_is_prefix_before_first_dash() {
        assert_eq!(platform_of("surface-insitu"), "surface");
        assert_eq!(platform_of("aircraft-pfp-flask"), "aircraft");
        assert_eq!(platform_of("tower"), "tower");
        assert_eq!(platform_of(""), "");
    }
}
