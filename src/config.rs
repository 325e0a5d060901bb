//! On-disk defaults for the command line.
//!
//! The file is optional. When present it lives at
//! `$XDG_CONFIG_HOME/pubsync/config.toml`, falling back to
//! `$HOME/.config/pubsync/config.toml`. Command-line flags override file
//! values, which override built-in defaults.

use std::env;
use std::ffi::OsString;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Key name.
        field: &'static str,
        /// Rejected value.
        value: u64,
        /// Accepted range.
        expected: &'static str,
    },
}

/// TOML-backed defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Corpus FTP host.
    pub host: Option<String>,
    /// HTTPS mirror base; used instead of FTP when set.
    pub mirror: Option<String>,
    /// Root output directory; partitions go to `baseline/` and `update/`.
    pub output_dir: Option<PathBuf>,
    /// Source index database file.
    pub index_path: Option<PathBuf>,
    /// Fetch attempt budget.
    pub max_attempts: Option<u32>,
    /// Required free space in gigabytes.
    pub min_free_gb: Option<u64>,
    /// Concurrent transfers.
    pub concurrency: Option<usize>,
    /// Delete archives after transformation.
    pub drop_archives: Option<bool>,
    /// FTP user; empty means anonymous.
    pub user: Option<String>,
    /// FTP password.
    pub password: Option<String>,
}

impl FileConfig {
    /// Parses and validates config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::OutOfRange`] for rejected values.
    pub fn from_toml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates values against the ranges the command line accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_attempts", self.max_attempts.map(u64::from), 1..=20, "1..=20")?;
        check_range(
            "concurrency",
            self.concurrency.map(|value| u64::try_from(value).unwrap_or(u64::MAX)),
            1..=16,
            "1..=16",
        )?;
        check_range("min_free_gb", self.min_free_gb, 0..=10_000, "0..=10000")?;
        Ok(())
    }
}

fn check_range(
    field: &'static str,
    value: Option<u64>,
    range: RangeInclusive<u64>,
    expected: &'static str,
) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if range.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::OutOfRange {
        field,
        value,
        expected,
    })
}

/// Loaded config plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed config when the file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/pubsync/config.toml`
/// 2. `$HOME/.config/pubsync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("pubsync").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("pubsync")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config from the default path when the file exists.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but is unreadable or invalid.
pub fn load_default_file_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

/// Loads and validates one config file.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file is unreadable or invalid.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = FileConfig::from_toml(&raw, path)?;
    debug!(path = %path.display(), "config file loaded");
    Ok(config)
}
