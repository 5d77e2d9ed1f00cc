use super::active::{ActiveSession, SharedSession};
use super::autosave::AutoSaver;
use super::updater::SessionUpdater;
use crate::recovery::{RecoveryManager, RecoverySource, reconstruct};
use parley_core::branch::{self, BranchNode};
use parley_core::config::{AppConfig, AutoSaveConfig, ConversationDefaults};
use parley_core::recovery::{CheckpointStore, RecoveryState};
use parley_core::search::SessionSearchResult;
use parley_core::session::{
    Attachment, ExportFormat, Message, MessageRole, Session, SessionInfo, SessionStore,
};
use parley_core::{ParleyError, Result};
use parley_infrastructure::load_attachment;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Result of making another session active.
#[derive(Debug)]
pub struct SwitchOutcome {
    pub session: SessionInfo,
    /// Set when saving the previously active session failed. The switch
    /// still happened.
    pub save_warning: Option<ParleyError>,
}

/// Result of a merge into the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub source_id: String,
    pub appended: usize,
    pub skipped: usize,
}

/// Result of restoring from a recovery checkpoint.
#[derive(Debug, Clone)]
pub struct RecoveredSession {
    pub session: SessionInfo,
    pub source: RecoverySource,
}

/// Facade over the session store, the recovery manager and branch/merge.
///
/// `SessionManager` is responsible for:
/// - Owning the active session shared with background tasks
/// - Creating, saving, loading, switching and deleting sessions
/// - Branching, merging and lineage views
/// - Starting and stopping the auto-save and checkpoint timers
///
/// Every store error is wrapped with the failing operation's name while
/// keeping its kind, so callers can still tell `NotFound` apart.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    recovery: Arc<RecoveryManager>,
    updater: SessionUpdater,
    active: SharedSession,
    defaults: ConversationDefaults,
    autosave_config: AutoSaveConfig,
    autosaver: Mutex<Option<AutoSaver>>,
}

impl SessionManager {
    /// Creates the facade with a fresh, unsaved active session.
    pub fn new(
        store: Arc<dyn SessionStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: &AppConfig,
    ) -> Self {
        let defaults = config.conversation.clone();
        let session = Self::fresh_session(store.as_ref(), &defaults, None);
        Self {
            recovery: Arc::new(RecoveryManager::new(checkpoints, config.recovery.clone())),
            updater: SessionUpdater::new(store.clone()),
            store,
            active: ActiveSession::unsaved(session).shared(),
            defaults,
            autosave_config: config.autosave.clone(),
            autosaver: Mutex::new(None),
        }
    }

    fn fresh_session(
        store: &dyn SessionStore,
        defaults: &ConversationDefaults,
        name: Option<&str>,
    ) -> Session {
        let mut session = store.new_session(name, &defaults.model);
        let prompt = defaults.system_prompt.clone();
        session.conversation.set_system_prompt(prompt);
        session
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    /// Handle to the active session for background tasks.
    pub fn shared_session(&self) -> SharedSession {
        self.active.clone()
    }

    pub async fn active_info(&self) -> SessionInfo {
        self.active.read().await.session.info()
    }

    pub async fn active_session(&self) -> Session {
        self.active.read().await.session.clone()
    }

    // ============================================================================
    // Startup and shutdown
    // ============================================================================

    /// Checks for a recovery checkpoint from a previous run.
    ///
    /// Returns the checkpoint when one is pending; the caller must then
    /// call [`recover`](Self::recover) or
    /// [`discard_recovery`](Self::discard_recovery). Otherwise the
    /// background timers are started immediately.
    pub async fn startup(&self) -> Result<Option<RecoveryState>> {
        let pending = self
            .recovery
            .initialize()
            .await
            .map_err(|e| e.context("startup"))?;
        if pending.is_none() {
            self.start_background().await?;
        }
        Ok(pending)
    }

    async fn start_background(&self) -> Result<()> {
        self.recovery.arm(self.active.clone()).await?;

        if self.autosave_config.enabled {
            let mut autosaver = self.autosaver.lock().await;
            if autosaver.is_none() {
                *autosaver = Some(AutoSaver::spawn(
                    self.store.clone(),
                    self.active.clone(),
                    self.autosave_config.interval(),
                ));
            }
        }
        Ok(())
    }

    /// Stops the timers, saves unsaved work, writes a final checkpoint and
    /// closes the store.
    ///
    /// `clean = false` (termination by signal) keeps the checkpoint so the
    /// next start offers recovery. A clean shutdown saves the active session
    /// even while a previous run's checkpoint is still pending.
    pub async fn shutdown(&self, clean: bool) -> Result<()> {
        if let Some(autosaver) = self.autosaver.lock().await.take() {
            autosaver.stop().await;
        }

        if clean && let Err(e) = self.persist_active().await {
            tracing::warn!("[SessionManager] Final save failed: {}", e);
        }

        let snapshot = self.active_session().await;
        self.recovery
            .shutdown(&snapshot, clean)
            .await
            .map_err(|e| e.context("shutdown"))?;
        self.store.close().await.map_err(|e| e.context("shutdown"))
    }

    /// Forces a checkpoint without clearing it, for an interrupt signal.
    pub async fn checkpoint_now(&self) -> Result<()> {
        let snapshot = self.active_session().await;
        self.recovery
            .checkpoint(&snapshot)
            .await
            .map_err(|e| e.context("checkpoint"))
    }

    /// Writes a checkpoint every time the process receives Ctrl-C.
    ///
    /// The checkpoint is kept, so a kill that follows the interrupt is
    /// recoverable on the next start.
    pub fn spawn_interrupt_checkpointer(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("[SessionManager] Interrupt received, writing checkpoint");
                if let Err(e) = manager.checkpoint_now().await {
                    tracing::warn!("[SessionManager] Interrupt checkpoint failed: {}", e);
                }
            }
        })
    }

    // ============================================================================
    // Recovery
    // ============================================================================

    /// Restores the pending checkpoint as the active session.
    ///
    /// The more complete of the snapshot and the stored copy wins. The
    /// result is saved before the checkpoint is cleared; if that save fails
    /// the checkpoint stays pending.
    pub async fn recover(&self) -> Result<RecoveredSession> {
        let state = self
            .recovery
            .pending()
            .await
            .ok_or_else(|| {
                ParleyError::invalid_state("No recovery checkpoint pending").context("recover")
            })?;

        let stored = match self.store.load_session(&state.session_id).await {
            Ok(session) => Some(session),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(
                    "[SessionManager] Stored copy of {} unreadable, using checkpoint: {}",
                    state.session_id,
                    e
                );
                None
            }
        };

        let (mut session, source) = reconstruct(&state, stored).map_err(|e| e.context("recover"))?;
        self.store
            .save_session(&mut session)
            .await
            .map_err(|e| e.context("recover"))?;

        let info = session.info();
        *self.active.write().await = ActiveSession::persisted(session);

        self.recovery
            .complete_recovery()
            .await
            .map_err(|e| e.context("recover"))?;
        self.start_background().await?;

        tracing::info!(
            "[SessionManager] Recovered session {} from {:?} ({} messages)",
            info.id,
            source,
            info.message_count
        );
        Ok(RecoveredSession { session: info, source })
    }

    /// Drops the pending checkpoint and continues with the current session.
    pub async fn discard_recovery(&self) -> Result<()> {
        self.recovery
            .discard()
            .await
            .map_err(|e| e.context("discard recovery"))?;
        self.start_background().await
    }

    // ============================================================================
    // Session lifecycle
    // ============================================================================

    async fn persist_active(&self) -> Result<()> {
        self.persist_active_when(ActiveSession::is_dirty).await
    }

    /// Saves the active session when `needed` says so.
    async fn persist_active_when(&self, needed: fn(&ActiveSession) -> bool) -> Result<()> {
        let mut active = self.active.write().await;
        if !needed(&active) {
            return Ok(());
        }
        let observed = active.session.updated;
        let mut copy = active.session.clone();
        self.store.save_session(&mut copy).await?;
        active.mark_saved(observed, &copy);
        Ok(())
    }

    /// Saves the outgoing session, reporting rather than returning failure.
    async fn save_before_leaving(&self) -> Option<ParleyError> {
        match self.persist_active().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "[SessionManager] Could not save session before switching: {}",
                    e
                );
                Some(e)
            }
        }
    }

    /// Starts a new, unsaved session after saving the current one.
    pub async fn new_session(&self, name: Option<&str>) -> SwitchOutcome {
        let save_warning = self.save_before_leaving().await;
        let session = Self::fresh_session(self.store.as_ref(), &self.defaults, name);
        let info = session.info();
        *self.active.write().await = ActiveSession::unsaved(session);

        tracing::info!("[SessionManager] Started session {}", info.id);
        SwitchOutcome {
            session: info,
            save_warning,
        }
    }

    /// Saves the active session, optionally renaming it first.
    pub async fn save(&self, name: Option<&str>) -> Result<SessionInfo> {
        let mut active = self.active.write().await;
        if let Some(name) = name {
            active.session.rename(name);
        }

        let observed = active.session.updated;
        let mut copy = active.session.clone();
        self.store
            .save_session(&mut copy)
            .await
            .map_err(|e| e.context("save"))?;
        active.mark_saved(observed, &copy);

        tracing::info!("[SessionManager] Saved session {}", copy.id);
        Ok(active.session.info())
    }

    /// Makes a stored session active, saving the current one first.
    ///
    /// A failed save of the current session does not block the switch; it
    /// is returned in [`SwitchOutcome::save_warning`]. Switching to the
    /// active session is a no-op.
    pub async fn switch(&self, target_id: &str) -> Result<SwitchOutcome> {
        self.switch_with_context(target_id, "switch").await
    }

    /// Same as [`switch`](Self::switch).
    pub async fn load(&self, id: &str) -> Result<SwitchOutcome> {
        self.switch_with_context(id, "load").await
    }

    async fn switch_with_context(&self, target_id: &str, operation: &str) -> Result<SwitchOutcome> {
        if self.active.read().await.session.id == target_id {
            return Ok(SwitchOutcome {
                session: self.active_info().await,
                save_warning: None,
            });
        }

        let save_warning = self.save_before_leaving().await;
        let target = self
            .store
            .load_session(target_id)
            .await
            .map_err(|e| e.context(operation))?;

        let info = target.info();
        *self.active.write().await = ActiveSession::persisted(target);

        tracing::info!("[SessionManager] Switched to session {}", info.id);
        Ok(SwitchOutcome {
            session: info,
            save_warning,
        })
    }

    pub async fn list(&self) -> Result<Vec<SessionInfo>> {
        self.store.list_sessions().await.map_err(|e| e.context("list"))
    }

    /// Deletes a stored session. The active session cannot be deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.active.read().await.session.id == id {
            return Err(
                ParleyError::invalid_state("Cannot delete the active session").context("delete")
            );
        }
        self.store
            .delete_session(id)
            .await
            .map_err(|e| e.context("delete"))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SessionSearchResult>> {
        self.store
            .search_sessions(query)
            .await
            .map_err(|e| e.context("search"))
    }

    /// Saves the active session and exports it.
    ///
    /// A session that was never saved is written first even when empty.
    /// Without a destination the file is `<id>.<ext>` in the current
    /// directory. Returns the path written.
    pub async fn export_active(
        &self,
        format: ExportFormat,
        destination: Option<&Path>,
    ) -> Result<PathBuf> {
        self.persist_active_when(|active| active.is_dirty() || !active.is_persisted())
            .await
            .map_err(|e| e.context("export"))?;

        let id = self.active.read().await.session.id.clone();
        let path = destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("{}.{}", id, format.extension())));

        self.store
            .export_session(&id, format.extension(), &path)
            .await
            .map_err(|e| e.context("export"))?;
        Ok(path)
    }

    // ============================================================================
    // Messages and attachments
    // ============================================================================

    /// Appends a message to the active session and checkpoints in the background.
    pub async fn add_message(&self, role: MessageRole, content: impl Into<String>) -> Message {
        let message = self
            .active
            .write()
            .await
            .session
            .add_message(role, content)
            .clone();
        self.recovery.checkpoint_in_background(self.active.clone());
        message
    }

    /// Reads a file and stages it for the next user message.
    pub async fn attach_file(&self, path: impl AsRef<Path>) -> Result<Attachment> {
        let attachment = load_attachment(path).await.map_err(|e| e.context("attach"))?;
        self.active
            .write()
            .await
            .session
            .stage_attachment(attachment.clone());
        tracing::debug!(
            "[SessionManager] Staged attachment {} ({})",
            attachment.name,
            attachment.mime_type
        );
        Ok(attachment)
    }

    /// History for the generation backend, system prompt first.
    pub async fn history_for_generation(&self) -> Vec<Message> {
        self.active
            .read()
            .await
            .session
            .conversation
            .history_for_generation()
    }

    // ============================================================================
    // Metadata
    // ============================================================================

    pub async fn rename(&self, name: &str) -> Result<SessionInfo> {
        if name.trim().is_empty() {
            return Err(
                ParleyError::invalid_argument("Session name cannot be empty").context("rename")
            );
        }
        let mut active = self.active.write().await;
        active.session.rename(name);
        Ok(active.session.info())
    }

    /// Tags the active session. Returns whether the tag was new.
    pub async fn add_tag(&self, tag: &str) -> bool {
        self.active.write().await.session.add_tag(tag)
    }

    /// Removes a tag from the active session. Returns whether it was present.
    pub async fn remove_tag(&self, tag: &str) -> bool {
        self.active.write().await.session.remove_tag(tag)
    }

    /// Tags any session; stored sessions are updated in place.
    pub async fn tag_session(&self, id: &str, tag: &str) -> Result<SessionInfo> {
        {
            let mut active = self.active.write().await;
            if active.session.id == id {
                active.session.add_tag(tag);
                return Ok(active.session.info());
            }
        }

        let session = self
            .updater
            .update(id, |s| {
                s.add_tag(tag);
                Ok(())
            })
            .await
            .map_err(|e| e.context("tag"))?;
        Ok(session.info())
    }

    // ============================================================================
    // Branch and merge
    // ============================================================================

    /// Forks the active session at `at` (default: its full length) into a
    /// new stored session. The active session does not change.
    pub async fn branch(&self, name: &str, at: Option<usize>) -> Result<SessionInfo> {
        let source = self.active_session().await;
        let at = at.unwrap_or_else(|| source.message_count());

        let mut child = branch::fork(&source, at, name).map_err(|e| e.context("branch"))?;
        self.store
            .save_session(&mut child)
            .await
            .map_err(|e| e.context("branch"))?;

        tracing::info!(
            "[SessionManager] Branched {} at {} into {}",
            source.id,
            at,
            child.id
        );
        Ok(child.info())
    }

    /// Stored sessions branched directly from the active session.
    pub async fn branches(&self) -> Result<Vec<SessionInfo>> {
        let id = self.active.read().await.session.id.clone();
        let sessions = self
            .store
            .list_sessions()
            .await
            .map_err(|e| e.context("branches"))?;
        Ok(branch::children_of(&sessions, &id))
    }

    /// The lineage tree containing the active session.
    pub async fn tree(&self) -> Result<BranchNode> {
        let active = self.active_info().await;
        let mut sessions = self
            .store
            .list_sessions()
            .await
            .map_err(|e| e.context("tree"))?;
        match sessions.iter_mut().find(|s| s.id == active.id) {
            Some(stored) => *stored = active.clone(),
            None => sessions.push(active.clone()),
        }

        let root = branch::resolve_root_id(&sessions, &active.id);
        Ok(branch::build_tree(&sessions, &root))
    }

    /// Appends the messages of `source_id` that the active session lacks.
    ///
    /// The merge is computed on a copy and saved before it replaces the
    /// active session; on any failure the active session is unchanged.
    pub async fn merge(&self, source_id: &str) -> Result<MergeSummary> {
        let mut active = self.active.write().await;
        if active.session.id == source_id {
            return Err(
                ParleyError::invalid_argument("Cannot merge a session into itself").context("merge")
            );
        }

        let source = self
            .store
            .load_session(source_id)
            .await
            .map_err(|e| e.context("merge"))?;
        let outcome = branch::merge_sessions(&active.session, &source);

        if outcome.appended > 0 {
            let mut merged = outcome.merged;
            self.store
                .save_session(&mut merged)
                .await
                .map_err(|e| e.context("merge"))?;
            *active = ActiveSession::persisted(merged);
        }

        tracing::info!(
            "[SessionManager] Merged {} into {}: {} appended, {} skipped",
            source_id,
            active.session.id,
            outcome.appended,
            outcome.skipped
        );
        Ok(MergeSummary {
            source_id: source_id.to_string(),
            appended: outcome.appended,
            skipped: outcome.skipped,
        })
    }
}
