//! Configuration service implementation.
//!
//! Loads the application configuration from `config.toml` and caches it.

use crate::paths::ParleyPaths;
use parley_core::config::AppConfig;
use parley_core::{ParleyError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Configuration service that loads and caches the application configuration.
///
/// A missing or empty file yields `AppConfig::default()`; a file that exists
/// but does not parse is a `Config` error rather than a silent fallback.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Service reading `<config_dir>/config.toml`.
    pub fn for_paths(paths: &ParleyPaths) -> Self {
        Self::new(paths.config_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the configuration, loading from file if not cached.
    pub async fn get_config(&self) -> Result<AppConfig> {
        if let Some(cached) = self.config.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let loaded = self.load_config().await?;
        *self.config.write().await = Some(loaded.clone());
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub async fn invalidate_cache(&self) {
        *self.config.write().await = None;
    }

    async fn load_config(&self) -> Result<AppConfig> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "[ConfigService] No config at {}, using defaults",
                    self.path.display()
                );
                return Ok(AppConfig::default());
            }
            Err(e) => {
                return Err(ParleyError::config(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(AppConfig::default());
        }

        toml::from_str(&content).map_err(|e| {
            ParleyError::config(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::config::StorageBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(temp_dir.path().join("config.toml"));
        assert_eq!(service.get_config().await.unwrap(), AppConfig::default());
    }

    #[tokio::test]
    async fn test_loads_and_caches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nbackend = \"sqlite\"\n").unwrap();

        let service = ConfigService::new(&path);
        assert_eq!(
            service.get_config().await.unwrap().storage.backend,
            StorageBackend::Sqlite
        );

        // Cached until invalidated
        std::fs::write(&path, "[storage]\nbackend = \"filesystem\"\n").unwrap();
        assert_eq!(
            service.get_config().await.unwrap().storage.backend,
            StorageBackend::Sqlite
        );
        service.invalidate_cache().await;
        assert_eq!(
            service.get_config().await.unwrap().storage.backend,
            StorageBackend::Filesystem
        );
    }

    #[tokio::test]
    async fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[storage\nbackend = ").unwrap();

        let err = ConfigService::new(&path).get_config().await.unwrap_err();
        assert_eq!(err.kind(), parley_core::ErrorKind::Config);
    }
}
