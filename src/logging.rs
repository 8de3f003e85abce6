//! Log output setup
//!
//! Progress and warnings go to stdout one line per event. `RUST_LOG`
//! overrides the level chosen on the command line.

use crate::errors::{ObsPackError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level used when neither `--verbose` nor `RUST_LOG` is given
pub const DEFAULT_LEVEL: &str = "info";

pub fn log_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        DEFAULT_LEVEL
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("obspack_daily={}", log_level(verbose))));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stdout),
        )
        .try_init()
        .map_err(|e| ObsPackError::Generic(format!("could not initialise logging: {}", e)))
}
