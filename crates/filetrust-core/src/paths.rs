use crate::error::{Result, TrustError};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "filetrust";
pub const APP_NAME: &str = "filetrust";

/// Environment variable that relocates all persisted state.
pub const DATA_DIR_ENV: &str = "FILETRUST_DATA_DIR";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).ok_or_else(|| {
        TrustError::InvalidArgument("cannot determine data directory".to_string())
    })?;
    Ok(dirs.data_dir().to_path_buf())
}

pub const BASELINES_DIR: &str = "baselines";
pub const SETTINGS_FILE: &str = "settings.json";

pub fn baselines_dir() -> Result<PathBuf> {
    Ok(baselines_dir_in(&data_dir()?))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(settings_path_in(&data_dir()?))
}

pub fn baselines_dir_in(data_dir: &Path) -> PathBuf {
    data_dir.join(BASELINES_DIR)
}

pub fn settings_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}
