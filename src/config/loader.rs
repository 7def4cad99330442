//! Config loader: reads `config.toml`, then applies environment overrides.
//!
//! # Loading precedence
//! 1. Defaults (`Config::default()`)
//! 2. TOML file (`--config` or `<config dir>/pdfchat/config.toml`)
//! 3. Environment variables `PDFCHAT_*`, and `GOOGLE_API_KEY` when no key is set

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pdfchat").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from `path` (or the default location) plus the process
/// environment.
///
/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => load_config_from_path(path, true)?,
        None => match default_config_path() {
            Some(default) => load_config_from_path(&default, false)?,
            None => {
                warn!("No config directory available, using defaults");
                Config::default()
            }
        },
    };
    let config = apply_env_overrides(config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Parse a TOML config file. A missing default file is not an error; a
/// missing explicit file is.
fn load_config_from_path(path: &Path, explicit: bool) -> Result<Config> {
    if !path.exists() {
        if explicit {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        info!("No config file found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    debug!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Apply environment overrides on top of a loaded config.
///
/// `lookup` is `std::env::var` in production and a map in tests.
///
/// Supported overrides:
/// - `PDFCHAT_HOST`, `PDFCHAT_PORT` → `gateway.*`
/// - `PDFCHAT_UPLOAD_DIR`, `PDFCHAT_MAX_UPLOAD_BYTES` → `upload.*`
/// - `PDFCHAT_API_BASE`, `PDFCHAT_API_KEY`, `PDFCHAT_MODEL` → `provider.*`
/// - `GOOGLE_API_KEY` → `provider.api_key` when still empty
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("PDFCHAT_HOST") {
        config.gateway.host = val;
    }
    if let Some(val) = lookup("PDFCHAT_PORT") {
        match val.parse::<u16>() {
            Ok(port) => config.gateway.port = port,
            Err(_) => warn!("Ignoring invalid PDFCHAT_PORT={val}"),
        }
    }
    if let Some(val) = lookup("PDFCHAT_UPLOAD_DIR") {
        config.upload.dir = val;
    }
    if let Some(val) = lookup("PDFCHAT_MAX_UPLOAD_BYTES") {
        match val.parse::<u64>() {
            Ok(n) => config.upload.max_bytes = n,
            Err(_) => warn!("Ignoring invalid PDFCHAT_MAX_UPLOAD_BYTES={val}"),
        }
    }
    if let Some(val) = lookup("PDFCHAT_API_BASE") {
        config.provider.api_base = val;
    }
    if let Some(val) = lookup("PDFCHAT_MODEL") {
        config.provider.model = val;
    }
    if let Some(val) = lookup("PDFCHAT_API_KEY") {
        config.provider.api_key = val;
    }
    if !config.provider.is_configured() {
        if let Some(val) = lookup("GOOGLE_API_KEY") {
            config.provider.api_key = val;
        }
    }
    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
