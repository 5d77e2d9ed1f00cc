//! Crash-recovery checkpoints.
//!
//! A checkpoint lives outside the session store and has its own lifecycle:
//! overwritten on every checkpoint, removed on clean shutdown or once the
//! operator has resolved it.

mod model;

pub use model::RecoveryState;

use crate::error::Result;
use async_trait::async_trait;

/// Persistence for the single recovery checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Overwrites the checkpoint. Must be all-or-nothing.
    async fn save(&self, state: &RecoveryState) -> Result<()>;

    /// Returns the checkpoint, or `None` when there is none.
    ///
    /// # Errors
    ///
    /// `CorruptRecord` if a checkpoint exists but cannot be read.
    async fn load(&self) -> Result<Option<RecoveryState>>;

    /// Removes the checkpoint. Clearing an absent checkpoint is not an error.
    async fn clear(&self) -> Result<()>;
}
