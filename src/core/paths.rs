// src/core/paths.rs

use crate::constants::{SETTINGS_FILENAME, SHIRE_DIR};
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref SHIRE_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Failed to expand path '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// Returns the path to the global shire configuration directory (`~/.config/shire`).
///
/// Memoized: the first call computes the path, later calls return the cached value.
/// The directory is not created; a missing global config is simply empty.
pub fn get_shire_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = SHIRE_CONFIG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }
    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join("shire");
    *cached = Some(config_path.clone());
    Ok(config_path)
}

/// Path of the global `shire.toml`.
pub fn get_global_settings_path() -> Result<PathBuf, PathError> {
    get_shire_config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

/// Path of a project's `.shire/shire.toml`.
pub fn project_settings_path(root: &Path) -> PathBuf {
    root.join(SHIRE_DIR).join(SETTINGS_FILENAME)
}

/// Walks up from `start` to the nearest directory holding a `.shire/` folder,
/// falling back to the nearest `.git` root and finally to `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    let start = dunce::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    let find = |marker: &str| {
        start
            .ancestors()
            .find(|dir| dir.join(marker).exists())
            .map(Path::to_path_buf)
    };
    find(SHIRE_DIR)
        .or_else(|| find(".git"))
        .unwrap_or(start)
}

/// Expands `~` and environment variables, resolving relative results against `base`.
pub fn expand_path(raw: &str, base: &Path) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(raw).map_err(|e| PathError::Expansion {
        path: raw.to_string(),
        message: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.into_owned());
    let joined = if path.is_absolute() {
        path
    } else {
        base.join(path)
    };
    Ok(dunce::simplified(&joined).to_path_buf())
}
