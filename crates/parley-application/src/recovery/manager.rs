//! Recovery checkpoint lifecycle.

use crate::session::SharedSession;
use chrono::Utc;
use parley_core::config::RecoveryConfig;
use parley_core::recovery::{CheckpointStore, RecoveryState};
use parley_core::session::Session;
use parley_core::{ParleyError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where the manager is in the checkpoint lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStatus {
    /// No checkpoint pending and no timer running.
    Idle,
    /// Periodic checkpointing is active.
    Armed,
    /// A checkpoint from a previous run awaits the operator's decision.
    Recoverable(RecoveryState),
    /// Shut down; later checkpoints are ignored so a cleared checkpoint
    /// stays cleared.
    Stopped,
}

/// Which copy a recovered session was rebuilt from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    Checkpoint,
    Store,
}

/// Checks a checkpoint against the configured maximum age.
///
/// # Errors
///
/// `RecoveryStale` when the checkpoint is older than `max_age`.
pub fn validate_checkpoint(
    state: RecoveryState,
    max_age: chrono::Duration,
) -> Result<RecoveryState> {
    let age = state.age_at(Utc::now());
    if age > max_age {
        return Err(ParleyError::RecoveryStale {
            session_id: state.session_id,
            age_secs: age.num_seconds(),
            max_age_secs: max_age.num_seconds(),
        });
    }
    Ok(state)
}

/// Picks the more complete of the checkpoint snapshot and the stored copy.
///
/// More messages wins; on a tie the later `updated` wins, and the stored
/// copy wins a full tie.
///
/// # Errors
///
/// `NotFound` when neither source has the session.
pub fn reconstruct(
    state: &RecoveryState,
    stored: Option<Session>,
) -> Result<(Session, RecoverySource)> {
    match (state.snapshot.clone(), stored) {
        (Some(snapshot), Some(stored)) => {
            let snapshot_key = (snapshot.message_count(), snapshot.updated);
            let stored_key = (stored.message_count(), stored.updated);
            if snapshot_key > stored_key {
                Ok((snapshot, RecoverySource::Checkpoint))
            } else {
                Ok((stored, RecoverySource::Store))
            }
        }
        (Some(snapshot), None) => Ok((snapshot, RecoverySource::Checkpoint)),
        (None, Some(stored)) => Ok((stored, RecoverySource::Store)),
        (None, None) => Err(ParleyError::session_not_found(&state.session_id)),
    }
}

struct Timer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives the Idle / Armed / Recoverable / Stopped state machine.
///
/// The manager never retries: a failed periodic or background checkpoint
/// is logged at `warn` and the next one tries again.
pub struct RecoveryManager {
    checkpoints: Arc<dyn CheckpointStore>,
    config: RecoveryConfig,
    status: Mutex<RecoveryStatus>,
    timer: Mutex<Option<Timer>>,
}

impl RecoveryManager {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>, config: RecoveryConfig) -> Self {
        Self {
            checkpoints,
            config,
            status: Mutex::new(RecoveryStatus::Idle),
            timer: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn status(&self) -> RecoveryStatus {
        self.status.lock().await.clone()
    }

    /// The unresolved checkpoint, if any.
    pub async fn pending(&self) -> Option<RecoveryState> {
        match &*self.status.lock().await {
            RecoveryStatus::Recoverable(state) => Some(state.clone()),
            _ => None,
        }
    }

    /// Looks for a checkpoint left by a previous run.
    ///
    /// Returns it when it is fresh enough to offer (state becomes
    /// Recoverable). Stale or unreadable checkpoints are cleared and treated
    /// as absent.
    pub async fn initialize(&self) -> Result<Option<RecoveryState>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let found = match self.checkpoints.load().await {
            Ok(found) => found,
            Err(e) if e.is_corrupt() => {
                tracing::warn!("[RecoveryManager] Discarding unreadable checkpoint: {}", e);
                self.clear_quietly().await;
                None
            }
            Err(e) => return Err(e),
        };

        let Some(state) = found else {
            *self.status.lock().await = RecoveryStatus::Idle;
            return Ok(None);
        };

        match validate_checkpoint(state, self.config.max_recovery_age()) {
            Ok(state) => {
                tracing::info!(
                    "[RecoveryManager] Found checkpoint for session {} ({} messages, taken {})",
                    state.session_id,
                    state.message_count,
                    state.timestamp
                );
                *self.status.lock().await = RecoveryStatus::Recoverable(state.clone());
                Ok(Some(state))
            }
            Err(stale) => {
                tracing::info!("[RecoveryManager] Ignoring checkpoint: {}", stale);
                self.clear_quietly().await;
                *self.status.lock().await = RecoveryStatus::Idle;
                Ok(None)
            }
        }
    }

    /// Clears the pending checkpoint after it was restored. State becomes Idle.
    pub async fn complete_recovery(&self) -> Result<()> {
        self.resolve("restored").await
    }

    /// Drops the pending checkpoint without restoring. State becomes Idle.
    pub async fn discard(&self) -> Result<()> {
        self.resolve("discarded").await
    }

    async fn resolve(&self, action: &str) -> Result<()> {
        let mut status = self.status.lock().await;
        let RecoveryStatus::Recoverable(state) = &*status else {
            return Err(ParleyError::invalid_state("No recovery checkpoint to resolve"));
        };
        let session_id = state.session_id.clone();

        self.checkpoints.clear().await?;
        *status = RecoveryStatus::Idle;
        tracing::info!("[RecoveryManager] Checkpoint for session {} {}", session_id, action);
        Ok(())
    }

    /// Writes a checkpoint of `session` now.
    ///
    /// Does nothing when recovery is disabled, after shutdown, or while a
    /// previous run's checkpoint is unresolved, so that checkpoint is never
    /// overwritten. Writes are serialized with the status lock held.
    pub async fn checkpoint(&self, session: &Session) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let status = self.status.lock().await;
        if matches!(*status, RecoveryStatus::Recoverable(_) | RecoveryStatus::Stopped) {
            return Ok(());
        }
        self.checkpoints.save(&RecoveryState::capture(session)).await
    }

    /// Checkpoints the shared session on a background task.
    pub fn checkpoint_in_background(
        self: &Arc<Self>,
        session: SharedSession,
    ) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }
        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            let snapshot = session.read().await.session.clone();
            if let Err(e) = manager.checkpoint(&snapshot).await {
                tracing::warn!("[RecoveryManager] Background checkpoint failed: {}", e);
            }
        }))
    }

    /// Starts the periodic checkpoint timer. State becomes Armed.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a checkpoint is still Recoverable or after
    /// shutdown.
    pub async fn arm(self: &Arc<Self>, session: SharedSession) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        {
            let mut status = self.status.lock().await;
            match *status {
                RecoveryStatus::Recoverable(_) => {
                    return Err(ParleyError::invalid_state(
                        "Resolve the pending recovery checkpoint before starting a session",
                    ));
                }
                RecoveryStatus::Stopped => {
                    return Err(ParleyError::invalid_state("Recovery manager is shut down"));
                }
                RecoveryStatus::Idle | RecoveryStatus::Armed => {}
            }
            *status = RecoveryStatus::Armed;
        }

        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let manager = Arc::clone(self);
        let interval = self.config.save_interval();

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = session.read().await.session.clone();
                        if let Err(e) = manager.checkpoint(&snapshot).await {
                            tracing::warn!("[RecoveryManager] Periodic checkpoint failed: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("[RecoveryManager] Checkpoint timer stopped");
        });

        *timer = Some(Timer { token, handle });
        tracing::debug!(
            "[RecoveryManager] Armed with {}s interval",
            self.config.save_interval_secs
        );
        Ok(())
    }

    async fn stop_timer(&self) {
        if let Some(timer) = self.timer.lock().await.take() {
            timer.token.cancel();
            let _ = timer.handle.await;
        }
    }

    /// Forces a final checkpoint of `session`, stops the timer and moves to
    /// Stopped.
    ///
    /// On a clean shutdown the checkpoint is then deleted; otherwise it is
    /// left for the next start to offer. An unresolved checkpoint from a
    /// previous run is left untouched either way. A second call does nothing.
    pub async fn shutdown(&self, session: &Session, clean: bool) -> Result<()> {
        self.stop_timer().await;
        if !self.config.enabled {
            return Ok(());
        }

        // Held until Stopped so an in-flight background checkpoint either
        // lands before the final write or sees Stopped and skips
        let mut status = self.status.lock().await;
        match *status {
            RecoveryStatus::Stopped => return Ok(()),
            RecoveryStatus::Recoverable(_) => {
                *status = RecoveryStatus::Stopped;
                return Ok(());
            }
            RecoveryStatus::Idle | RecoveryStatus::Armed => {}
        }

        self.checkpoints.save(&RecoveryState::capture(session)).await?;
        if clean {
            self.checkpoints.clear().await?;
            tracing::debug!("[RecoveryManager] Clean shutdown, checkpoint cleared");
        } else {
            tracing::info!(
                "[RecoveryManager] Checkpoint kept for session {} after abnormal exit",
                session.id
            );
        }
        *status = RecoveryStatus::Stopped;
        Ok(())
    }

    async fn clear_quietly(&self) {
        if let Err(e) = self.checkpoints.clear().await {
            tracing::warn!("[RecoveryManager] Failed to clear checkpoint: {}", e);
        }
    }
}
