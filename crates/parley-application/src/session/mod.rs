//! Session application services.
//!
//! This module contains the Session Manager facade and the pieces it
//! composes: the shared active session, the auto-save timer, and the
//! updater for stored sessions that are not active.

mod active;
mod autosave;
mod manager;
mod updater;

pub use active::{ActiveSession, SharedSession};
pub use autosave::AutoSaver;
pub use manager::{MergeSummary, RecoveredSession, SessionManager, SwitchOutcome};
pub use updater::SessionUpdater;
