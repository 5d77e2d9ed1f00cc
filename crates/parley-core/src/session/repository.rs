//! Session store trait.
//!
//! Defines the interface every storage backend implements.

use super::export::ExportFormat;
use super::model::{Session, SessionInfo};
use crate::error::{ParleyError, Result};
use crate::search::{SessionSearchResult, search_session};
use async_trait::async_trait;
use std::path::Path;

/// An abstract store for session persistence.
///
/// This trait defines the contract for persisting and retrieving sessions,
/// decoupling the application's core logic from the specific storage medium
/// (JSON files, embedded database).
///
/// # Implementation Notes
///
/// Implementations must present identical external behavior:
/// - `save_session` is all-or-nothing
/// - `load_session` fails with `NotFound` or `CorruptRecord`
/// - `load_all`/`list_sessions` skip records that fail to deserialize
/// - `delete_session` fails with `NotFound` when the record is absent
/// - `close` is idempotent
///
/// No cross-process locking is performed; concurrent writers of the same
/// id race and the last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short name of the storage medium, for logging.
    fn backend_name(&self) -> &'static str;

    /// Creates a fresh session. Nothing is persisted until `save_session`.
    fn new_session(&self, name: Option<&str>, model: &str) -> Session {
        Session::new(name, model)
    }

    /// Upserts a session by id, refreshing `updated` to now.
    async fn save_session(&self, session: &mut Session) -> Result<()>;

    /// Loads a session by id.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no record exists
    /// - `CorruptRecord` if the stored bytes cannot be deserialized
    async fn load_session(&self, id: &str) -> Result<Session>;

    /// Loads every readable session, skipping corrupt records.
    async fn load_all(&self) -> Result<Vec<Session>>;

    /// Removes a session irreversibly.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no record exists
    async fn delete_session(&self, id: &str) -> Result<()>;

    /// Releases backend resources. Calling it twice is a no-op.
    async fn close(&self) -> Result<()>;

    /// Lists all sessions, most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let mut infos: Vec<SessionInfo> = self
            .load_all()
            .await?
            .iter()
            .map(Session::info)
            .collect();
        infos.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.id.cmp(&b.id)));
        Ok(infos)
    }

    /// Case-insensitive substring search over every stored session.
    ///
    /// Each session appears at most once in the result.
    async fn search_sessions(&self, query: &str) -> Result<Vec<SessionSearchResult>> {
        let mut sessions = self.load_all().await?;
        sessions.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.id.cmp(&b.id)));

        let mut seen = std::collections::HashSet::new();
        Ok(sessions
            .iter()
            .filter(|s| seen.insert(s.id.clone()))
            .filter_map(|s| search_session(s, query))
            .collect())
    }

    /// Serializes a stored session to `destination` as `json` or `markdown`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedFormat` for any other format
    /// - `NotFound` / `CorruptRecord` from loading
    async fn export_session(&self, id: &str, format: &str, destination: &Path) -> Result<()> {
        let format: ExportFormat = format.parse()?;
        let session = self.load_session(id).await?;
        let rendered = format.render(&session)?;

        let target = destination.display().to_string();
        let io_err = |e: std::io::Error| ParleyError::storage_io("export", target.clone(), e);
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(destination, rendered).await.map_err(io_err)?;

        tracing::info!(
            "[SessionStore] Exported session {} as {:?} to {}",
            id,
            format,
            destination.display()
        );
        Ok(())
    }
}
