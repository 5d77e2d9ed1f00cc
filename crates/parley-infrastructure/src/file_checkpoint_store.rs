//! File-backed recovery checkpoint.

use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use parley_core::Result;
use parley_core::recovery::{CheckpointStore, RecoveryState};
use std::path::{Path, PathBuf};

/// Stores the single recovery checkpoint as one JSON file, separate from
/// the session store.
pub struct FileCheckpointStore {
    file: AtomicJsonFile<RecoveryState>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: AtomicJsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &RecoveryState) -> Result<()> {
        self.file.save(state).await?;
        tracing::trace!(
            "[FileCheckpointStore] Checkpointed session {} ({} messages)",
            state.session_id,
            state.message_count
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<RecoveryState>> {
        self.file.load().await
    }

    async fn clear(&self) -> Result<()> {
        if self.file.remove().await? {
            tracing::debug!("[FileCheckpointStore] Cleared {}", self.path().display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::{MessageRole, Session};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_checkpoint_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path().join("recovery.json"));
        assert!(store.load().await.unwrap().is_none());

        let mut session = Session::new(Some("draft"), "gpt-4o");
        session.add_message(MessageRole::User, "unsaved thought");
        let state = RecoveryState::capture(&session);

        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // Clearing again is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp_dir.path().join("recovery.json"));
        std::fs::write(store.path(), "garbage").unwrap();

        assert!(store.load().await.unwrap_err().is_corrupt());
    }
}
