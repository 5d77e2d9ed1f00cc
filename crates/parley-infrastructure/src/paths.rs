//! Unified path management for parley data and configuration.
//!
//! All paths derive from two roots: the config directory (`config.toml`)
//! and the data directory (sessions, database, recovery checkpoint). A
//! configured `base_dir` replaces the data root, which is how tests and
//! portable installs keep everything under one directory.

use parley_core::config::StorageConfig;
use parley_core::{ParleyError, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "parley";

/// Resolved filesystem layout.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/parley/            # Config directory
/// └── config.toml              # Application configuration
///
/// ~/.local/share/parley/       # Data directory (or storage.base_dir)
/// ├── sessions/                # One <id>.json per session (filesystem backend)
/// ├── sessions.db              # SQLite backend
/// └── recovery.json            # Crash-recovery checkpoint
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParleyPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    database_override: Option<PathBuf>,
}

impl ParleyPaths {
    /// Platform default locations.
    ///
    /// # Errors
    ///
    /// `Config` if neither a config nor a home directory can be determined.
    pub fn platform() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ParleyError::config("Cannot find config directory"))?
            .join(APP_DIR);
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| ParleyError::config("Cannot find data directory"))?
            .join(APP_DIR);
        Ok(Self {
            config_dir,
            data_dir,
            database_override: None,
        })
    }

    /// Everything under a single root, config included.
    pub fn with_base(base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref().to_path_buf();
        Self {
            config_dir: base.clone(),
            data_dir: base,
            database_override: None,
        }
    }

    /// Applies `base_dir` / `database_path` overrides from storage config.
    pub fn for_storage(storage: &StorageConfig) -> Result<Self> {
        let mut paths = match &storage.base_dir {
            Some(base) => {
                let mut paths = Self::platform().unwrap_or_else(|_| Self::with_base(base));
                paths.data_dir = base.clone();
                paths
            }
            None => Self::platform()?,
        };
        paths.database_override = storage.database_path.clone();
        Ok(paths)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn database_file(&self) -> PathBuf {
        self.database_override
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sessions.db"))
    }

    pub fn recovery_file(&self) -> PathBuf {
        self.data_dir.join("recovery.json")
    }
}
