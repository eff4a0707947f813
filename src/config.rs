//! Run configuration loaded from `config.toml` under the `.discpack` folder.
//!
//! Config keys (TOML): `jobs_root`, `staging_root`, `working_dir`,
//! `disc_capacity_bytes`, `split_part_bytes`, `carrier_subdir`,
//! `trash_dir_name`. Everything has a default so a missing file still yields
//! a usable configuration for a scratch run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// Default filename used to store the run configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Capacity ceiling of one disc folder: 4 GiB, the reference deployment's
/// single-layer DVD budget.
pub const DEFAULT_DISC_CAPACITY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Part size used when a job's archive has to be split: 2 GiB.
pub const DEFAULT_SPLIT_PART_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Subtree of a job folder holding derivative carrier files.
pub const DEFAULT_CARRIER_SUBDIR: &str = "Deliverables/Image_Carriers";

/// Errors that can occur while loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to resolve config directory: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// Settings for one archive run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root of the sharded job tree (`Jobs0`..`Jobs9` live directly under it).
    #[serde(default = "default_jobs_root")]
    pub jobs_root: PathBuf,
    /// Root under which disc folders are created and filled.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    /// Scratch space for freshly produced archives before placement.
    ///
    /// Defaults to the staging root, matching the historical layout where
    /// zips were produced next to the disc folders.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_disc_capacity")]
    pub disc_capacity_bytes: u64,
    #[serde(default = "default_split_part")]
    pub split_part_bytes: u64,
    /// Relative path inside a job folder that dedup operates on.
    #[serde(default = "default_carrier_subdir")]
    pub carrier_subdir: PathBuf,
    /// Name of the per-job trash folder emptied before archiving.
    #[serde(default = "default_trash_dir_name")]
    pub trash_dir_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs_root: default_jobs_root(),
            staging_root: default_staging_root(),
            working_dir: None,
            disc_capacity_bytes: default_disc_capacity(),
            split_part_bytes: default_split_part(),
            carrier_subdir: default_carrier_subdir(),
            trash_dir_name: default_trash_dir_name(),
        }
    }
}

impl RunConfig {
    /// Effective scratch directory for produced archives.
    pub fn working_dir(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or(&self.staging_root)
    }
}

fn default_jobs_root() -> PathBuf {
    PathBuf::from("/Volumes/JobsA")
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("/Volumes/SGB-TITAN/_ReadyForBackup")
}

fn default_disc_capacity() -> u64 {
    DEFAULT_DISC_CAPACITY_BYTES
}

fn default_split_part() -> u64 {
    DEFAULT_SPLIT_PART_BYTES
}

fn default_carrier_subdir() -> PathBuf {
    PathBuf::from(DEFAULT_CARRIER_SUBDIR)
}

fn default_trash_dir_name() -> String {
    "Trash".to_string()
}

/// Resolve the configuration file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir()?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load configuration from disk, returning defaults if the file is missing.
pub fn load_or_default() -> Result<RunConfig, ConfigError> {
    load_from_path(&config_path()?)
}

/// Load configuration from a specific path, returning defaults if missing.
pub fn load_from_path(path: &Path) -> Result<RunConfig, ConfigError> {
    if !path.exists() {
        return Ok(RunConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Persist configuration, creating parent directories as needed.
pub fn save_to_path(config: &RunConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
