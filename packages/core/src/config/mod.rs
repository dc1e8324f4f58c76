//! Configuration management for chef-bootstrap
//!
//! Handles loading the JSONC settings file and layering it beneath the
//! command line. A missing file is not an error: every setting has a default.

pub mod layers;
pub mod paths;
pub mod schema;
pub mod ssh_config;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use jsonc_parser::parse_to_serde_value;

pub use layers::ConfigLayers;
pub use paths::{get_config_dir, get_config_path, get_user_template_dir};
pub use schema::Config;
pub use ssh_config::{SshConfigMatch, query_ssh_config_file};

/// Load configuration from `~/.chef/bootstrap.json`
///
/// Returns the default configuration when the file does not exist.
pub fn load_config() -> Result<Config> {
    let config_path =
        get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if !config_path.exists() {
        tracing::debug!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        return Ok(Config::new());
    }

    load_config_from(&config_path)
}

/// Load configuration from an explicit path
///
/// Supports JSONC (JSON with comments).
/// Rejects unknown fields for strict validation.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let mut file = File::open(config_path)
        .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let parsed_value = parse_to_serde_value(&contents, &Default::default())
        .map_err(|e| anyhow::anyhow!("Invalid JSONC in config file: {}", e))?
        .ok_or_else(|| anyhow::anyhow!("Config file is empty"))?;

    let config: Config = serde_json::from_value(parsed_value).with_context(|| {
        format!(
            "Invalid configuration in {}. Check for unknown fields or invalid values.",
            config_path.display()
        )
    })?;

    tracing::debug!("Loaded config from: {}", config_path.display());
    Ok(config)
}
