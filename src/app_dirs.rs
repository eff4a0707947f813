//! Application directory helpers anchored to a single `.discpack` folder.
//!
//! Config and log files live under the OS config directory by default;
//! `DISCPACK_CONFIG_HOME` points them somewhere else for tests or portable
//! installs.

use std::path::PathBuf;

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the base config root.
pub const APP_DIR_NAME: &str = ".discpack";

/// Environment variable that overrides the base config root.
pub const CONFIG_HOME_ENV: &str = "DISCPACK_CONFIG_HOME";

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base config directory could be resolved.
    #[error("No suitable base config directory available for application files")]
    NoBaseDir,
    /// Failed to create the application directory.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the root `.discpack` directory, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = match std::env::var_os(CONFIG_HOME_ENV) {
        Some(path) => PathBuf::from(path),
        None => BaseDirs::new()
            .ok_or(AppDirError::NoBaseDir)?
            .config_dir()
            .to_path_buf(),
    };
    ensure_dir(base.join(APP_DIR_NAME))
}

/// Return the logs directory inside the `.discpack` root, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("logs"))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
