//! Recovery checkpoint record.

use crate::session::Session;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A crash-recovery checkpoint for the active session.
///
/// Written far more often than a normal save and deleted on clean shutdown,
/// so a checkpoint found at startup means the previous run did not exit
/// cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    pub session_id: String,
    pub session_name: String,
    /// When the checkpoint was taken
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
    /// Full copy of the session at checkpoint time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Session>,
}

impl RecoveryState {
    /// Captures a checkpoint of `session` stamped with the current time.
    pub fn capture(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            session_name: session.name.clone(),
            timestamp: Utc::now(),
            message_count: session.message_count(),
            snapshot: Some(session.clone()),
        }
    }

    /// Age of the checkpoint relative to `now`. Never negative.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }

    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// True when the checkpoint is older than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageRole;

    #[test]
    fn test_capture_copies_session() {
        let mut session = Session::new(Some("work"), "gpt-4o");
        session.add_message(MessageRole::User, "hello");

        let state = RecoveryState::capture(&session);
        assert_eq!(state.session_id, session.id);
        assert_eq!(state.session_name, "work");
        assert_eq!(state.message_count, 1);
        assert_eq!(state.snapshot.as_ref(), Some(&session));
    }

    #[test]
    fn test_staleness() {
        let session = Session::new(None, "gpt-4o");
        let mut state = RecoveryState::capture(&session);
        assert!(!state.is_stale(Duration::hours(24)));

        state.timestamp = Utc::now() - Duration::hours(25);
        assert!(state.is_stale(Duration::hours(24)));
        assert!(state.age() >= Duration::hours(25));
    }

    #[test]
    fn test_future_timestamp_has_zero_age() {
        let session = Session::new(None, "gpt-4o");
        let mut state = RecoveryState::capture(&session);
        state.timestamp = Utc::now() + Duration::minutes(5);
        assert_eq!(state.age(), Duration::zero());
    }
}
