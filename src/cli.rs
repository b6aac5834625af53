//! CLI arguments and subcommands for perfdata-consolidator.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use perfdata_consolidator::config::ConfigFormat;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parses a config file level; unknown names fall back to `Info`.
    pub fn from_config(level: &str) -> Self {
        <LogLevel as ValueEnum>::from_str(level, true).unwrap_or(LogLevel::Info)
    }
}

/// Output format for the simulate summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "perfdata-consolidator",
    about = "Consolidates parsed performance monitoring files into per-host time series",
    long_about = "Consolidates parsed performance monitoring files into per-host time series.\n\n\
                  Merges NMON, Perfmon, iostat and similar data sets for the same host, \
                  reconciling differing field sets and unifying process identities across files.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments
        #[arg(long)]
        commented: bool,
    },

    /// Consolidate synthetic parsed files and print a per-host summary
    Simulate {
        /// Number of hosts
        #[arg(long, default_value_t = 3)]
        hosts: usize,

        /// Files per host
        #[arg(short = 'f', long, default_value_t = 4)]
        files: usize,

        /// Records per file
        #[arg(short = 'r', long, default_value_t = 60)]
        records: usize,

        /// Seconds between records
        #[arg(long, default_value_t = 60)]
        interval: u64,

        /// Random seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
