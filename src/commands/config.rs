//! Config command implementation.
//!
//! Writes the default configuration in various formats.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

use perfdata_consolidator::config::{render_config, Config, ConfigFormat};

/// Writes the default configuration to `output`, or to stdout for "-".
pub fn command_config(output: Option<PathBuf>, format: ConfigFormat, commented: bool) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| {
        PathBuf::from(match format {
            ConfigFormat::Yaml => "perfdata-consolidator.yaml",
            ConfigFormat::Json => "perfdata-consolidator.json",
            ConfigFormat::Toml => "perfdata-consolidator.toml",
        })
    });

    let content = render_config(&Config::default(), format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}
