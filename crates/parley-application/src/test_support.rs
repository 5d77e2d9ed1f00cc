//! In-memory stores for unit tests.

use async_trait::async_trait;
use parley_core::recovery::{CheckpointStore, RecoveryState};
use parley_core::session::{Session, SessionStore};
use parley_core::{ParleyError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

// Mock SessionStore for testing
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    fail_saves: AtomicBool,
    pub saves: AtomicUsize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent save fail with `StorageIo`.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn save_session(&self, session: &mut Session) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ParleyError::storage_io("save", session.id.clone(), "disk full"));
        }
        session.touch();
        let stored = session.clone();
        self.sessions.lock().unwrap().insert(stored.id.clone(), stored);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Session> {
        self.get(id).ok_or_else(|| ParleyError::session_not_found(id))
    }

    async fn load_all(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.lock().unwrap().values().cloned().collect())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ParleyError::session_not_found(id))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// Mock CheckpointStore for testing
pub struct InMemoryCheckpointStore {
    state: Mutex<Option<RecoveryState>>,
    save_delay: Option<Duration>,
    pub saves: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            save_delay: None,
            saves: AtomicUsize::new(0),
        }
    }

    /// Every save sleeps for `delay` before it lands.
    pub fn with_save_delay(delay: Duration) -> Self {
        Self {
            save_delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn with_state(state: RecoveryState) -> Self {
        let store = Self::new();
        *store.state.lock().unwrap() = Some(state);
        store
    }

    pub fn current(&self) -> Option<RecoveryState> {
        self.state.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &RecoveryState) -> Result<()> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        *self.state.lock().unwrap() = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<RecoveryState>> {
        Ok(self.current())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.lock().unwrap() = None;
        Ok(())
    }
}
