//! Embedded-database SessionStore backed by SQLite.
//!
//! Each session is one row: the full record as JSON in `data`, plus a few
//! projected columns (`name`, timestamps, `message_count`, `parent_id`) for
//! inspection and lineage queries.

use crate::dto::{SessionCodec, current_schema_version};
use async_trait::async_trait;
use parley_core::session::{Session, SessionStore, validate_id};
use parley_core::{ParleyError, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    created        TEXT NOT NULL,
    updated        TEXT NOT NULL,
    message_count  INTEGER NOT NULL,
    parent_id      TEXT,
    schema_version TEXT NOT NULL,
    data           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_parent_id ON sessions(parent_id);
";

/// Backend settings read from `storage.*` pass-through keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqliteOptions {
    /// `busy_timeout_ms`
    pub busy_timeout: Option<Duration>,
    /// `journal_mode`, WAL when unset
    pub journal_mode: Option<String>,
}

impl SqliteOptions {
    pub fn from_settings(settings: &BTreeMap<String, Value>) -> Self {
        Self {
            busy_timeout: settings
                .get("busy_timeout_ms")
                .and_then(Value::as_u64)
                .map(Duration::from_millis),
            journal_mode: settings
                .get("journal_mode")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

fn sql_error<'a>(
    operation: &'static str,
    target: &'a str,
) -> impl Fn(rusqlite::Error) -> ParleyError + 'a {
    move |e| ParleyError::storage_io(operation, target, e)
}

/// SQLite-backed session store.
///
/// A single connection guarded by a mutex; every query runs on the blocking
/// pool so the async runtime is never stalled. `close` drops the connection,
/// after which every operation fails with `StorageIo`.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Option<Connection>>>,
    codec: Arc<SessionCodec>,
    path: PathBuf,
}

impl SqliteSessionStore {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub async fn open(path: impl AsRef<Path>, options: SqliteOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let target = db_path.display().to_string();
            if let Some(parent) = db_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ParleyError::storage_io("open", target.clone(), e))?;
            }

            let conn = Connection::open(&db_path).map_err(sql_error("open", &target))?;
            if let Some(timeout) = options.busy_timeout {
                conn.busy_timeout(timeout).map_err(sql_error("open", &target))?;
            }
            let mode = options.journal_mode.as_deref().unwrap_or("WAL");
            conn.pragma_update_and_check(None, "journal_mode", mode, |row| row.get::<_, String>(0))
                .map_err(sql_error("open", &target))?;
            conn.execute_batch(SCHEMA).map_err(sql_error("open", &target))?;
            Ok(conn)
        })
        .await
        .map_err(|e| ParleyError::internal(format!("Failed to spawn blocking task: {}", e)))??;

        tracing::debug!("[SqliteSessionStore] Opened {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            codec: Arc::new(SessionCodec::new()?),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run_blocking<F, R>(&self, operation: &'static str, target: String, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection, &str) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn_arc
                .lock()
                .map_err(|_| ParleyError::internal("SQLite connection mutex poisoned"))?;
            match guard.as_mut() {
                Some(conn) => f(conn, &target),
                None => Err(ParleyError::storage_io(operation, target, "store is closed")),
            }
        })
        .await
        .map_err(|e| ParleyError::internal(format!("Task execution failed: {}", e)))?
    }
}

/// Column value as bytes; NULL and numeric payloads are unreadable.
fn data_bytes(value: SqlValue) -> Option<Vec<u8>> {
    match value {
        SqlValue::Text(s) => Some(s.into_bytes()),
        SqlValue::Blob(b) => Some(b),
        _ => None,
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn save_session(&self, session: &mut Session) -> Result<()> {
        validate_id(&session.id)?;
        let mut stamped = session.clone();
        stamped.touch();
        let data = String::from_utf8(self.codec.encode(&stamped)?)
            .map_err(|e| ParleyError::internal(format!("Record is not UTF-8: {}", e)))?;
        let version = current_schema_version().to_string();

        let row = stamped.clone();
        self.run_blocking("save", stamped.id.clone(), move |conn, target| {
            let tx = conn.transaction().map_err(sql_error("save", target))?;
            tx.execute(
                "INSERT INTO sessions
                    (id, name, created, updated, message_count, parent_id, schema_version, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    created = excluded.created,
                    updated = excluded.updated,
                    message_count = excluded.message_count,
                    parent_id = excluded.parent_id,
                    schema_version = excluded.schema_version,
                    data = excluded.data",
                params![
                    row.id,
                    row.name,
                    row.created.to_rfc3339(),
                    row.updated.to_rfc3339(),
                    row.message_count() as i64,
                    row.parent_id,
                    version,
                    data,
                ],
            )
            .map_err(sql_error("save", target))?;
            tx.commit().map_err(sql_error("save", target))
        })
        .await?;

        session.updated = stamped.updated;
        tracing::debug!(
            "[SqliteSessionStore] Saved session {} ({} messages)",
            session.id,
            session.message_count()
        );
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Session> {
        validate_id(id)?;
        let data = self
            .run_blocking("load", id.to_string(), |conn, target| {
                conn.query_row(
                    "SELECT data FROM sessions WHERE id = ?1",
                    params![target],
                    |row| row.get::<_, SqlValue>(0),
                )
                .optional()
                .map_err(sql_error("load", target))
            })
            .await?
            .ok_or_else(|| ParleyError::session_not_found(id))?;

        let bytes =
            data_bytes(data).ok_or_else(|| ParleyError::corrupt(id, "data column is not text"))?;
        let record = self.codec.decode(id, &bytes)?;
        if record.was_migrated() {
            tracing::info!(
                "[SqliteSessionStore] Migrated session {} from schema {}",
                id,
                record.schema_version
            );
        }
        Ok(record.session)
    }

    async fn load_all(&self) -> Result<Vec<Session>> {
        let rows = self
            .run_blocking("list", self.path.display().to_string(), |conn, target| {
                let mut stmt = conn
                    .prepare("SELECT id, data FROM sessions")
                    .map_err(sql_error("list", target))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, SqlValue>(1)?))
                    })
                    .map_err(sql_error("list", target))?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(sql_error("list", target))?;
                Ok(rows)
            })
            .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for (id, data) in rows {
            let decoded = data_bytes(data)
                .ok_or_else(|| ParleyError::corrupt(&id, "data column is not text"))
                .and_then(|bytes| self.codec.decode(&id, &bytes));
            match decoded {
                Ok(record) => sessions.push(record.session),
                Err(e) => {
                    tracing::warn!(
                        "[SqliteSessionStore] Skipping unreadable session {}: {}",
                        id,
                        e
                    );
                }
            }
        }
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let removed = self
            .run_blocking("delete", id.to_string(), |conn, target| {
                conn.execute("DELETE FROM sessions WHERE id = ?1", params![target])
                    .map_err(sql_error("delete", target))
            })
            .await?;

        if removed == 0 {
            return Err(ParleyError::session_not_found(id));
        }
        tracing::info!("[SqliteSessionStore] Deleted session {}", id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let conn_arc = self.conn.clone();
        let target = self.path.display().to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = conn_arc
                .lock()
                .map_err(|_| ParleyError::internal("SQLite connection mutex poisoned"))?;
            if let Some(conn) = guard.take() {
                conn.close()
                    .map_err(|(_, e)| ParleyError::storage_io("close", target, e))?;
                tracing::debug!("[SqliteSessionStore] Closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| ParleyError::internal(format!("Task execution failed: {}", e)))?
    }
}
