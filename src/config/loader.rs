// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic checks.
///
/// Use [`load_and_validate`] unless you need the raw sections.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        vm_types = config.vm_type.len(),
        workflows = config.workflow.len(),
        "config parsed"
    );

    Ok(config)
}

/// Load a configuration file and validate it into a runnable [`ConfigFile`].
///
/// Rejects, among others:
/// - an empty VM catalog or workload,
/// - non-positive mips, price or billing period,
/// - probabilities outside `[0, 1]`,
/// - unknown parents or files, and cyclic workflows.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Cloudsched.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Cloudsched.toml")
}
