// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a pipeline definition and return the raw, unvalidated model.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

/// Parse a pipeline definition from TOML text without validating it.
pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a pipeline definition from disk and validate it.
///
/// This is the entry point for the rest of the application. It checks for
/// missing nodes, unknown or self-referencing upstreams, duplicate test
/// names and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// `Modelflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Modelflow.toml")
}
