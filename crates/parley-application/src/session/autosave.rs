//! Periodic auto-save of the active session.

use super::active::SharedSession;
use parley_core::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running auto-save timer. Stops when [`AutoSaver::stop`] is called.
pub struct AutoSaver {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl AutoSaver {
    /// Starts saving `session` to `store` every `interval`.
    ///
    /// A tick is skipped when the session has not changed since its last
    /// durable save. Failures are logged and never stop the timer.
    pub fn spawn(store: Arc<dyn SessionStore>, session: SharedSession, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        save_if_dirty(store.as_ref(), &session).await;
                    }
                }
            }
            tracing::debug!("[AutoSaver] Stopped");
        });

        tracing::debug!("[AutoSaver] Started with {}s interval", interval.as_secs());
        Self { token, handle }
    }

    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// One auto-save pass. Returns whether a write happened.
pub(crate) async fn save_if_dirty(store: &dyn SessionStore, session: &SharedSession) -> bool {
    let (mut copy, observed) = {
        let active = session.read().await;
        if !active.is_dirty() {
            return false;
        }
        (active.session.clone(), active.session.updated)
    };

    match store.save_session(&mut copy).await {
        Ok(()) => {
            session.write().await.mark_saved(observed, &copy);
            tracing::debug!("[AutoSaver] Saved session {}", copy.id);
            true
        }
        Err(e) => {
            tracing::warn!("[AutoSaver] Auto-save of session {} failed: {}", copy.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ActiveSession;
    use crate::test_support::InMemorySessionStore;
    use parley_core::session::{MessageRole, Session};

    #[tokio::test]
    async fn test_skips_unchanged_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let shared = ActiveSession::unsaved(Session::new(None, "gpt-4o")).shared();

        // Empty and never saved
        assert!(!save_if_dirty(store.as_ref(), &shared).await);

        shared.write().await.session.add_message(MessageRole::User, "hi");
        assert!(save_if_dirty(store.as_ref(), &shared).await);
        assert!(!save_if_dirty(store.as_ref(), &shared).await);
        assert_eq!(store.save_count(), 1);

        shared.write().await.session.add_message(MessageRole::Assistant, "hello");
        assert!(save_if_dirty(store.as_ref(), &shared).await);
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_fatal() {
        let store = Arc::new(InMemorySessionStore::new());
        store.fail_saves(true);
        let shared = ActiveSession::unsaved(Session::new(None, "gpt-4o")).shared();
        shared.write().await.session.add_message(MessageRole::User, "hi");

        assert!(!save_if_dirty(store.as_ref(), &shared).await);
        assert!(shared.read().await.is_dirty());

        store.fail_saves(false);
        assert!(save_if_dirty(store.as_ref(), &shared).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_saves_on_interval() {
        let store = Arc::new(InMemorySessionStore::new());
        let shared = ActiveSession::unsaved(Session::new(None, "gpt-4o")).shared();
        shared.write().await.session.add_message(MessageRole::User, "hi");

        let saver = AutoSaver::spawn(store.clone(), shared.clone(), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(store.save_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.save_count(), 1);

        // Nothing changed: the next tick writes nothing
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(store.save_count(), 1);

        saver.stop().await;
    }
}
