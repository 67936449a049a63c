//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use planner_http::types::{DEFAULT_CELL_SIZE, DEFAULT_STEP_METRES};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the worker and check its health endpoint
    Health,

    /// Start the worker and print supervisor diagnostics
    Status,

    /// Build the survey grid over the cached boundary
    Grid {
        /// Grid cell size in metres
        #[arg(long, value_name = "METRES", default_value_t = DEFAULT_CELL_SIZE)]
        cell_size: f64,
    },

    /// Compile a mission description file
    Compile {
        /// Path to the mission file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Waypoint spacing in metres
        #[arg(long, value_name = "METRES", default_value_t = DEFAULT_STEP_METRES)]
        step: f64,

        /// Snap waypoints to grid cell centroids
        #[arg(long)]
        snap_to_grid: bool,

        /// Cell size of the grid to snap to
        #[arg(long, value_name = "METRES", requires = "snap_to_grid")]
        grid_cell_size: Option<f64>,
    },

    /// Fetch and cache the mission area boundary
    Boundary,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_arguments() {
        let cli = Cli::try_parse_from([
            "fl-mission",
            "compile",
            "survey.mission",
            "--step",
            "2.5",
            "--snap-to-grid",
            "--grid-cell-size",
            "500",
        ])
        .unwrap();

        match cli.command {
            Commands::Compile {
                file,
                step,
                snap_to_grid,
                grid_cell_size,
            } => {
                assert_eq!(file, PathBuf::from("survey.mission"));
                assert_eq!(step, 2.5);
                assert!(snap_to_grid);
                assert_eq!(grid_cell_size, Some(500.0));
            }
            _ => panic!("expected compile command"),
        }
    }

    #[test]
    fn test_defaults_and_global_flags() {
        let cli = Cli::try_parse_from(["fl-mission", "grid", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Grid { cell_size } if cell_size == DEFAULT_CELL_SIZE));
    }

    #[test]
    fn test_grid_cell_size_requires_snap() {
        assert!(Cli::try_parse_from([
            "fl-mission",
            "compile",
            "a.mission",
            "--grid-cell-size",
            "500"
        ])
        .is_err());
    }
}
