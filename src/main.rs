//! perfdata-consolidator
//!
//! Command-line front end with tracing logging. Resolves configuration and
//! dispatches subcommands.

mod cli;
mod commands;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_simulate, SimulateOptions};
use perfdata_consolidator::config::{load_config, render_config, validate_effective_config, Config};
use perfdata_consolidator::ArrayPool;

/// Initializes tracing logging subsystem with the effective log level.
///
/// The CLI flag wins over the config file's `log_level`.
fn setup_logging(config: &Config, args: &Args) {
    let level = args.log_level.unwrap_or_else(|| {
        config
            .log_level
            .as_deref()
            .map(LogLevel::from_config)
            .unwrap_or(LogLevel::Info)
    });
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return;
    }

    debug!("Logging initialized with level: {:?}", level);
}

/// Resolves configuration: `--no-config` gives defaults, otherwise the given
/// file or the first default location.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    if args.no_config {
        return Ok(Config::default());
    }
    load_config(args.config.as_deref()).context("Failed to load configuration")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        print!("{}", render_config(&config, args.config_format, false)?);
        return Ok(());
    }

    let Some(command) = &args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    // Check reports invalid configuration itself.
    if !matches!(command, Commands::Check) {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }

    setup_logging(&config, &args);
    ArrayPool::global().set_enabled(config.pool_zero_arrays);
    info!("Starting perfdata-consolidator");

    match command {
        Commands::Check => command_check(&config),

        Commands::Config {
            output,
            format,
            commented,
        } => command_config(output.clone(), *format, *commented),

        Commands::Simulate {
            hosts,
            files,
            records,
            interval,
            seed,
            format,
        } => command_simulate(
            SimulateOptions {
                hosts: *hosts,
                files: *files,
                records: *records,
                interval_secs: *interval,
                seed: *seed,
            },
            *format,
            &config,
        ),
    }
}
