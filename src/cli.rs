//! Defines command-line interface options using `clap` for obspack_daily.

use crate::config::DEFAULT_CONFIG_PATH;
use clap::Parser;
use std::path::PathBuf;

/// Re-packages ObsPack observation files into daily netCDF files
#[derive(Parser, Debug)]
#[command(
    version,
    name = "obspack_daily",
    about = "Split ObsPack observations into daily files for transport-model sampling"
)]
pub struct Args {
    /// Path to the YAML settings document
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_config() {
        let args = Args::parse_from(["obspack_daily"]);
        assert_eq!(args.config, PathBuf::from("config.yml"));
        assert!(!args.verbose);
    }

    #[test]
    fn accepts_config_and_verbose() {
        let args = Args::parse_from(["obspack_daily", "--config", "run.yml", "-v"]);
        assert_eq!(args.config, PathBuf::from("run.yml"));
        assert!(args.verbose);
    }
}
