//! Filesystem SessionStore: one JSON document per session.

use crate::dto::{SessionCodec, SessionRecord};
use crate::storage::{AtomicJsonFile, RawRead};
use async_trait::async_trait;
use parley_core::session::{Session, SessionStore, validate_id};
use parley_core::{ParleyError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;

const EXTENSION: &str = "json";

/// Directory-backed session store.
///
/// Directory structure:
/// ```text
/// sessions_dir/
/// ├── 20250101-093000-1a2b3c4d.json
/// └── 20250102-141500-5e6f7a8b.json
/// ```
///
/// Every save replaces the whole file atomically. Files that fail to parse
/// are skipped by `load_all` and left untouched on disk.
pub struct JsonDirSessionStore {
    sessions_dir: PathBuf,
    codec: SessionCodec,
    closed: AtomicBool,
}

impl JsonDirSessionStore {
    /// Opens the store, creating `sessions_dir` if needed.
    pub async fn new(sessions_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = sessions_dir.as_ref().to_path_buf();
        fs::create_dir_all(&sessions_dir).await.map_err(|e| {
            ParleyError::storage_io("open", sessions_dir.display().to_string(), e)
        })?;

        tracing::debug!(
            "[JsonDirSessionStore] Opened at {}",
            sessions_dir.display()
        );
        Ok(Self {
            sessions_dir,
            codec: SessionCodec::new()?,
            closed: AtomicBool::new(false),
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn file_for(&self, id: &str) -> Result<AtomicJsonFile<Value>> {
        validate_id(id)?;
        Ok(AtomicJsonFile::new(
            self.sessions_dir.join(format!("{}.{}", id, EXTENSION)),
        ))
    }

    fn ensure_open(&self, operation: &'static str, target: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ParleyError::storage_io(operation, target, "store is closed"));
        }
        Ok(())
    }

    async fn read_record(&self, id: &str) -> Result<SessionRecord> {
        let file = self.file_for(id)?;
        match file.read_raw().await? {
            RawRead::Missing => Err(ParleyError::session_not_found(id)),
            RawRead::Empty => Err(ParleyError::corrupt(id, "empty record")),
            RawRead::Bytes(bytes) => self.codec.decode(id, &bytes),
        }
    }
}

#[async_trait]
impl SessionStore for JsonDirSessionStore {
    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn save_session(&self, session: &mut Session) -> Result<()> {
        self.ensure_open("save", &session.id)?;
        let file = self.file_for(&session.id)?;

        let mut stamped = session.clone();
        stamped.touch();
        let bytes = self.codec.encode(&stamped)?;
        file.write_bytes(&bytes).await?;

        // Only reflect the new timestamp once the write is durable
        session.updated = stamped.updated;
        tracing::debug!(
            "[JsonDirSessionStore] Saved session {} ({} messages)",
            session.id,
            session.message_count()
        );
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Session> {
        self.ensure_open("load", id)?;
        let record = self.read_record(id).await?;
        if record.was_migrated() {
            tracing::info!(
                "[JsonDirSessionStore] Migrated session {} from schema {}",
                id,
                record.schema_version
            );
        }
        Ok(record.session)
    }

    async fn load_all(&self) -> Result<Vec<Session>> {
        self.ensure_open("list", &self.sessions_dir.display().to_string())?;
        let target = self.sessions_dir.display().to_string();
        let io_err = |e: std::io::Error| ParleyError::storage_io("list", target.clone(), e);

        let mut entries = fs::read_dir(&self.sessions_dir).await.map_err(io_err)?;
        let mut sessions = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }

            match self.read_record(id).await {
                Ok(record) => sessions.push(record.session),
                Err(e) => {
                    tracing::warn!(
                        "[JsonDirSessionStore] Skipping unreadable session {}: {}",
                        id,
                        e
                    );
                }
            }
        }

        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.ensure_open("delete", id)?;
        if !self.file_for(id)?.remove().await? {
            return Err(ParleyError::session_not_found(id));
        }
        tracing::info!("[JsonDirSessionStore] Deleted session {}", id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("[JsonDirSessionStore] Closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::{Attachment, MessageRole};
    use tempfile::TempDir;

    async fn store() -> (TempDir, JsonDirSessionStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDirSessionStore::new(temp_dir.path().join("sessions"))
            .await
            .unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (_dir, store) = store().await;

        let mut session = store.new_session(Some("Round trip"), "claude-3-5-sonnet");
        session.conversation.set_temperature(Some(0.7)).unwrap();
        session.conversation.set_system_prompt(Some("be brief".to_string()));
        session.add_tag("work");
        session.stage_attachment(Attachment::new("a.png", "image/png", vec![0, 159, 146, 150]));
        session.add_message(MessageRole::User, "look at this");
        session.add_message(MessageRole::Assistant, "nice picture");
        session.parent_id = Some("20250101-000000-00000000".to_string());
        session.branch_point = Some(0);

        let before = session.updated;
        store.save_session(&mut session).await.unwrap();
        assert!(session.updated >= before);

        let loaded = store.load_session(&session.id).await.unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let (_dir, store) = store().await;
        let err = store.load_session("20250101-000000-00000000").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_load_but_not_listing() {
        let (_dir, store) = store().await;
        let mut good = store.new_session(Some("good"), "gpt-4o");
        store.save_session(&mut good).await.unwrap();

        std::fs::write(store.sessions_dir().join("broken.json"), "{{{").unwrap();
        std::fs::write(store.sessions_dir().join("notes.txt"), "ignored").unwrap();

        assert!(store.load_session("broken").await.unwrap_err().is_corrupt());

        let infos = store.list_sessions().await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, good.id);
        // Left untouched
        assert!(store.sessions_dir().join("broken.json").exists());
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let (_dir, store) = store().await;
        let mut session = store.new_session(None, "gpt-4o");
        store.save_session(&mut session).await.unwrap();

        store.delete_session(&session.id).await.unwrap();
        assert!(store.load_session(&session.id).await.unwrap_err().is_not_found());
        assert!(store.delete_session(&session.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_path_like_ids_are_rejected() {
        let (_dir, store) = store().await;
        for id in ["../escape", "a/b", ".hidden", ""] {
            let err = store.load_session(id).await.unwrap_err();
            assert_eq!(err.kind(), parley_core::ErrorKind::InvalidArgument, "{id}");
        }
    }

    #[tokio::test]
    async fn test_unversioned_file_is_migrated_on_load() {
        let (_dir, store) = store().await;
        let session = store.new_session(Some("legacy"), "gpt-4o");
        let mut value = serde_json::to_value(&session).unwrap();
        value["metadata"] = serde_json::json!({"parent_id": "20250101-000000-00000000"});
        let path = store.sessions_dir().join(format!("{}.json", session.id));
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        let loaded = store.load_session(&session.id).await.unwrap();
        assert_eq!(loaded.parent_id.as_deref(), Some("20250101-000000-00000000"));
        assert!(loaded.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_io() {
        let (_dir, store) = store().await;
        store.close().await.unwrap();
        store.close().await.unwrap();

        let mut session = store.new_session(None, "gpt-4o");
        assert!(store.save_session(&mut session).await.unwrap_err().is_storage_io());
    }
}
