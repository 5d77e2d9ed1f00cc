//! Session updater helper for common update patterns.
//!
//! This module provides `SessionUpdater` which abstracts the common
//! "load → update → save" pattern used by metadata operations on stored
//! sessions that are not currently active.

use parley_core::Result;
use parley_core::session::{Session, SessionStore};
use std::sync::Arc;

/// Helper struct for updating stored sessions with a common pattern.
///
/// `SessionUpdater` encapsulates:
/// 1. Loading a session from storage
/// 2. Applying updates
/// 3. Updating the timestamp
/// 4. Saving back to storage
pub struct SessionUpdater {
    store: Arc<dyn SessionStore>,
}

impl SessionUpdater {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Updates a stored session by applying `updater`, returning the saved copy.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session doesn't exist (`NotFound`)
    /// - The updater function returns an error (nothing is saved)
    /// - Saving to storage fails
    pub async fn update<F>(&self, session_id: &str, updater: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let mut session = self.store.load_session(session_id).await?;

        updater(&mut session)?;
        session.touch();

        self.store.save_session(&mut session).await?;
        tracing::debug!("[SessionUpdater] Updated session {}", session.id);
        Ok(session)
    }
}
