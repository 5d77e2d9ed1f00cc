pub mod branch;
pub mod config;
pub mod error;
pub mod recovery;
pub mod search;
pub mod session;

// Re-export common error type
pub use error::{ErrorKind, ParleyError, Result};
