// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::defaults::builtin_layout;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DevflowError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks names, globs, the source/destination layout and composed-task
///   cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load `path`, falling back to the built-in layout when `path` is the
/// default config path and does not exist.
///
/// An explicitly chosen path that does not exist is an error.
pub fn load_or_builtin(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.exists() {
        return load_and_validate(path);
    }
    if path == default_config_path() {
        info!("no {:?} found; using the built-in project layout", path);
        return ConfigFile::try_from(builtin_layout());
    }
    Err(DevflowError::ConfigError(format!(
        "config file {:?} does not exist",
        path
    )))
}

/// Default config path: `Devflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Devflow.toml")
}
