//! Configuration management for perfdata-consolidator.
//!
//! This module handles loading and validating configuration files. It supports
//! YAML, JSON, and TOML formats; YAML is assumed for unknown extensions.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MAX_COLLISION_WARNINGS: usize = 25;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Configuration format options for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Consolidation behaviour of a `SystemDataSet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Individual collision warnings logged per merge call (default: 25)
    #[serde(default = "default_max_collision_warnings")]
    pub max_collision_warnings: usize,

    /// Unify processes with the same name and pid under the earliest start
    /// time (default: true)
    #[serde(default = "default_true")]
    pub unify_process_start_times: bool,
}

fn default_max_collision_warnings() -> usize {
    DEFAULT_MAX_COLLISION_WARNINGS
}
fn default_true() -> bool {
    true
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_collision_warnings: default_max_collision_warnings(),
            unify_process_start_times: true,
        }
    }
}

/// Derived data computed for each parsed file before consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessingConfig {
    /// Add `Busy%` to CPU types (default: true)
    #[serde(default = "default_true")]
    pub cpu_busy: bool,

    /// Add per-name process aggregates (default: false)
    #[serde(default)]
    pub aggregate_processes: bool,

    /// Primary ids whose sub types get a `Total` sub type
    #[serde(default = "default_totals")]
    pub totals: Vec<String>,
}

fn default_totals() -> Vec<String> {
    vec!["NET".to_string(), "DISKBUSY".to_string()]
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            cpu_busy: true,
            aggregate_processes: false,
            totals: default_totals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // Logging
    pub log_level: Option<String>,

    /// Share all-zero value arrays between records process-wide
    /// (default: true)
    #[serde(default = "default_true")]
    pub pool_zero_arrays: bool,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default, alias = "post-processing")]
    pub post_processing: PostProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some(DEFAULT_LOG_LEVEL.into()),
            pool_zero_arrays: true,
            merge: MergeConfig::default(),
            post_processing: PostProcessingConfig::default(),
        }
    }
}

/// Validate effective config (used by --check-config and the check command)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if let Some(level) = cfg.log_level.as_deref() {
        if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            bail!(
                "Invalid log_level '{}', expected one of {}",
                level,
                LOG_LEVELS.join(", ")
            );
        }
    }

    if let Some(pos) = cfg
        .post_processing
        .totals
        .iter()
        .position(|t| t.trim().is_empty())
    {
        bail!("post_processing.totals[{}] must not be empty", pos);
    }

    Ok(())
}

/// Loads configuration from `path`, or from the first default location that
/// exists. Returns `Config::default()` when no file is found.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/perfdata-consolidator/config.yaml",
                "/etc/perfdata-consolidator/config.yml",
                "/etc/perfdata-consolidator/config.json",
                "./perfdata-consolidator.yaml",
                "./perfdata-consolidator.yml",
                "./perfdata-consolidator.json",
                "./perfdata-consolidator.toml",
            ];
            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Serializes `config` in the requested format. Comments are only added to
/// YAML output.
pub fn render_config(config: &Config, format: ConfigFormat, commented: bool) -> anyhow::Result<String> {
    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => {
            let content = serde_yaml::to_string(config)?;
            if commented {
                add_config_comments(content)
            } else {
                content
            }
        }
    };
    Ok(content)
}

fn add_config_comments(yaml: String) -> String {
    let comments = r#"# perfdata-consolidator configuration
# ===================================
#
# log_level: "info"                  # off, error, warn, info, debug, trace
# pool_zero_arrays: true             # Share all-zero value arrays between records
#
# Consolidation
# -------------
# merge:
#   max_collision_warnings: 25       # Collision warnings logged per merge
#   unify_process_start_times: true  # Same name + pid across files is one process
#
# Post processing of parsed files
# -------------------------------
# post_processing:
#   cpu_busy: true                   # Add Busy% = User% + Sys% to CPU types
#   aggregate_processes: false       # Add per-name process aggregates
#   totals: ["NET", "DISKBUSY"]      # Primary ids that get a Total sub type
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.merge.max_collision_warnings, 25);
        assert!(config.merge.unify_process_start_times);
        assert!(config.post_processing.cpu_busy);
        assert!(!config.post_processing.aggregate_processes);
        assert_eq!(config.post_processing.totals, vec!["NET", "DISKBUSY"]);
        assert!(validate_effective_config(&config).is_ok());
    }

    #[test]
    fn test_load_yaml_with_partial_sections() {
        let file = write_config(
            ".yaml",
            "log_level: debug\nmerge:\n  max_collision_warnings: 3\n",
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.merge.max_collision_warnings, 3);
        assert!(config.pool_zero_arrays);
        assert_eq!(config.post_processing, PostProcessingConfig::default());
    }

    #[test]
    fn test_load_json() {
        let file = write_config(
            ".json",
            r#"{"log_level": "warn", "post_processing": {"totals": ["NET"]}}"#,
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.post_processing.totals, vec!["NET"]);
        assert!(config.post_processing.cpu_busy);
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            "log_level = \"trace\"\npool_zero_arrays = false\n\n[merge]\nunify_process_start_times = false\n",
        );
        let config = load_config(Some(file.path())).unwrap();
        assert!(!config.pool_zero_arrays);
        assert!(!config.merge.unify_process_start_times);
        assert_eq!(config.merge.max_collision_warnings, 25);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let file = write_config(".yaml", "merge: [unclosed\n");
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.log_level = Some("verbose".into());
        assert!(validate_effective_config(&config).is_err());

        let mut config = Config::default();
        config.post_processing.totals.push("  ".into());
        let err = validate_effective_config(&config).unwrap_err();
        assert!(err.to_string().contains("totals[2]"));
    }

    #[test]
    fn test_render_formats_reload() {
        let config = Config::default();
        let yaml = render_config(&config, ConfigFormat::Yaml, true).unwrap();
        assert!(yaml.starts_with("# perfdata-consolidator"));
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);

        let toml_text = render_config(&config, ConfigFormat::Toml, false).unwrap();
        let parsed: Config = toml::from_str(&toml_text).unwrap();
        assert_eq!(parsed, config);
    }
}
