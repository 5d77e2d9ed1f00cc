//! Explicit backend selection.

use crate::json_dir_session_store::JsonDirSessionStore;
use crate::paths::ParleyPaths;
use crate::sqlite_session_store::{SqliteOptions, SqliteSessionStore};
use parley_core::Result;
use parley_core::config::{StorageBackend, StorageConfig};
use parley_core::session::SessionStore;
use std::sync::Arc;

/// Opens the session store named by `storage.backend` at the locations in `paths`.
pub async fn open_session_store(
    storage: &StorageConfig,
    paths: &ParleyPaths,
) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match storage.backend {
        StorageBackend::Filesystem => {
            Arc::new(JsonDirSessionStore::new(paths.sessions_dir()).await?)
        }
        StorageBackend::Sqlite => Arc::new(
            SqliteSessionStore::open(
                paths.database_file(),
                SqliteOptions::from_settings(&storage.extra),
            )
            .await?,
        ),
    };

    tracing::info!("[StoreFactory] Using {} session store", store.backend_name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_opens_each_backend() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ParleyPaths::with_base(temp_dir.path());

        let fs_store = open_session_store(&StorageConfig::default(), &paths)
            .await
            .unwrap();
        assert_eq!(fs_store.backend_name(), "filesystem");
        assert!(paths.sessions_dir().is_dir());

        let sqlite = StorageConfig {
            backend: StorageBackend::Sqlite,
            ..Default::default()
        };
        let db_store = open_session_store(&sqlite, &paths).await.unwrap();
        assert_eq!(db_store.backend_name(), "sqlite");
        assert!(paths.database_file().exists());
    }
}
