//! Command-line interface for eegsync
//!
//! Provides argument parsing using clap derive macros.

use crate::config::DeviceKind;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// EEG recording synchronized with a cue video and a marker schedule
#[derive(Parser, Debug)]
#[command(
    name = "eegsync",
    version,
    about = "EEG recording synchronized with a cue video and a marker schedule"
)]
pub struct Cli {
    /// Subcommand to execute (default: record)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: marker clears, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Cue video to play during the recording
    #[arg(long, value_name = "FILE", conflicts_with = "no_video")]
    pub video: Option<PathBuf>,

    /// Record EEG only, without video or prompting for one
    #[arg(long)]
    pub no_video: bool,

    /// Marker schedule CSV (time_seconds,label)
    #[arg(long, short = 'm', value_name = "FILE")]
    pub markers: Option<PathBuf>,

    /// Output CSV file (default: generated name in the output directory)
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory for generated output files
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Subject identifier used in the generated file name
    #[arg(long, short = 's', value_name = "ID")]
    pub subject: Option<String>,

    /// Countdown before recording starts. Examples: 15, 15s, 1m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub countdown: Option<Duration>,

    /// Data source: cyton-daisy (OpenBCI board) or synthetic (no hardware)
    #[arg(long, value_name = "KIND")]
    pub device: Option<DeviceKind>,

    /// Serial port of the board's USB dongle
    #[arg(long, value_name = "PORT")]
    pub serial_port: Option<String>,

    /// Synthetic board sample rate in Hz
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Write the session summary as JSON next to the output file
    #[arg(long)]
    pub summary_json: bool,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the parsed marker schedule
    Markers {
        /// Marker file (default: configured marker file)
        path: Option<PathBuf>,

        /// Number of markers to show
        #[arg(long, short = 'n', value_name = "N", default_value = "10")]
        limit: usize,
    },

    /// Check video players, marker file and output directory
    Check,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
