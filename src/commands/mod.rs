//! CLI command implementations for perfdata-consolidator.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration validation
//! - `config`: Configuration file generation
//! - `simulate`: Consolidation of synthetic host data

pub mod check;
pub mod config;
pub mod simulate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use simulate::{command_simulate, SimulateOptions};
