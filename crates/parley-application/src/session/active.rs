//! The in-memory active session shared with background tasks.

use chrono::{DateTime, Utc};
use parley_core::session::Session;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle shared by the facade, the auto-save timer and checkpoint writers.
///
/// Background tasks clone the session under a read lock and write the
/// clone; they never hold the lock across I/O.
pub type SharedSession = Arc<RwLock<ActiveSession>>;

/// The active session plus what is known about its last durable save.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session: Session,
    /// `updated` of the last copy written to the store, `None` if never saved.
    last_saved: Option<DateTime<Utc>>,
}

impl ActiveSession {
    /// A session that has not been written to the store yet.
    pub fn unsaved(session: Session) -> Self {
        Self {
            session,
            last_saved: None,
        }
    }

    /// A session exactly as it is in the store.
    pub fn persisted(session: Session) -> Self {
        let last_saved = Some(session.updated);
        Self {
            session,
            last_saved,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn is_persisted(&self) -> bool {
        self.last_saved.is_some()
    }

    /// True when the in-memory copy has changes the store does not.
    ///
    /// A never-saved session with no messages is not considered dirty.
    pub fn is_dirty(&self) -> bool {
        match self.last_saved {
            Some(saved) => self.session.updated > saved,
            None => !self.session.conversation.is_empty(),
        }
    }

    /// Records that `saved` (a clone taken when `session.updated` was
    /// `observed`) is now durable.
    ///
    /// If the session changed after the clone was taken, only the marker
    /// moves and the session stays dirty.
    pub fn mark_saved(&mut self, observed: DateTime<Utc>, saved: &Session) {
        if self.session.id != saved.id {
            return;
        }
        if self.session.updated == observed {
            self.session.updated = saved.updated;
            self.last_saved = Some(saved.updated);
        } else {
            self.last_saved = Some(observed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_core::session::MessageRole;

    #[test]
    fn test_dirty_tracking() {
        let mut active = ActiveSession::unsaved(Session::new(None, "gpt-4o"));
        assert!(!active.is_dirty());

        active.session.add_message(MessageRole::User, "hi");
        assert!(active.is_dirty());

        let observed = active.session.updated;
        let mut saved = active.session.clone();
        saved.updated = observed + Duration::milliseconds(5);
        active.mark_saved(observed, &saved);

        assert!(active.is_persisted());
        assert!(!active.is_dirty());
        assert_eq!(active.session.updated, saved.updated);
    }

    #[test]
    fn test_change_during_save_stays_dirty() {
        let mut active = ActiveSession::unsaved(Session::new(None, "gpt-4o"));
        active.session.add_message(MessageRole::User, "first");

        let observed = active.session.updated;
        let mut saved = active.session.clone();
        saved.updated = observed + Duration::seconds(1);

        // Main loop appends while the save is in flight
        active.session.add_message(MessageRole::Assistant, "second");
        active.session.updated = observed + Duration::milliseconds(500);
        active.mark_saved(observed, &saved);

        assert!(active.is_dirty());
        assert_eq!(active.session.message_count(), 2);
    }

    #[test]
    fn test_mark_saved_ignores_other_session() {
        let mut active = ActiveSession::unsaved(Session::new(None, "gpt-4o"));
        active.session.add_message(MessageRole::User, "hi");
        let other = Session::new(None, "gpt-4o");

        active.mark_saved(other.updated, &other);
        assert!(!active.is_persisted());
    }
}
