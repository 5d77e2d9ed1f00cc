//! Crash recovery: the checkpoint state machine and its timer.

mod manager;

pub use manager::{
    RecoveryManager, RecoverySource, RecoveryStatus, reconstruct, validate_checkpoint,
};
