//! Application layer for Parley.
//!
//! This crate composes the domain types and the storage backends into the
//! operations the front end calls: the session lifecycle, crash recovery,
//! branching and merging.

pub mod command;
pub mod recovery;
pub mod session;

#[cfg(test)]
mod test_support;

pub use command::SessionCommand;
pub use recovery::{RecoveryManager, RecoveryStatus};
pub use session::{SessionManager, SwitchOutcome};
