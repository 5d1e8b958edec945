use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

const APP_DIR: &str = ".cubetrack";
const CONFIG_FILE: &str = "config.yml";
const CREDENTIAL_FILE: &str = "credential.json";

/// Get the application directory (`~/.cubetrack`)
pub fn app_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(APP_DIR))
        .ok_or_else(|| BridgeError::config("Cannot determine home directory"))
}

/// Get the default configuration file path
pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(CONFIG_FILE))
}

/// Get the default credential store path
pub fn default_credential_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(CREDENTIAL_FILE))
}

/// Resolve the config path from an explicit override or the default
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path(),
    }
}

/// Resolve a path from the config file; relative paths are relative to the config file directory
pub fn resolve_relative(config_path: &Path, value: &Path) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|dir| dir.join(value))
            .unwrap_or_else(|| value.to_path_buf())
    } else {
        value.to_path_buf()
    }
}
