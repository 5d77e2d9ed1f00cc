//! Error types for Parley.

use thiserror::Error;

/// A shared error type for the whole session lifecycle subsystem.
///
/// Backends, the recovery manager and the facade all return this type so the
/// front end can tell a missing session apart from a broken disk without
/// knowing which backend is in use.
#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    /// Entity not found error with type information
    #[error("{entity_type} not found: '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Stored bytes exist but cannot be deserialized
    #[error("Corrupt record '{id}': {message}")]
    CorruptRecord { id: String, message: String },

    /// Branch index outside `0..=len`
    #[error("Invalid branch point {index}: conversation has {len} message(s)")]
    InvalidBranchPoint { index: usize, len: usize },

    /// Export format other than json/markdown
    #[error("Unsupported export format: '{0}' (expected 'json' or 'markdown')")]
    UnsupportedFormat(String),

    /// Underlying storage medium failure
    #[error("Storage I/O error during {operation} of '{target}': {message}")]
    StorageIo {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Recovery checkpoint older than the configured maximum age
    #[error(
        "Recovery checkpoint for session '{session_id}' is stale ({age_secs}s old, max {max_age_secs}s)"
    )]
    RecoveryStale {
        session_id: String,
        age_secs: i64,
        max_age_secs: i64,
    },

    /// Serialization failure while writing
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Caller supplied an out-of-range or malformed argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Another error wrapped with the facade operation that produced it
    #[error("{operation} failed: {source}")]
    Context {
        operation: String,
        #[source]
        source: Box<ParleyError>,
    },
}

/// The identity of a [`ParleyError`], independent of any context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    CorruptRecord,
    InvalidBranchPoint,
    UnsupportedFormat,
    StorageIo,
    RecoveryStale,
    Serialization,
    InvalidArgument,
    InvalidState,
    Config,
    Internal,
}

impl ParleyError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a NotFound error for a session id
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::not_found("Session", id)
    }

    /// Creates a CorruptRecord error
    pub fn corrupt(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a StorageIo error
    pub fn storage_io(
        operation: &'static str,
        target: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::StorageIo {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Creates an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an InvalidState error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps this error with the name of the operation that failed.
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Returns the underlying error identity, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            Self::InvalidBranchPoint { .. } => ErrorKind::InvalidBranchPoint,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::StorageIo { .. } => ErrorKind::StorageIo,
            Self::RecoveryStale { .. } => ErrorKind::RecoveryStale,
            Self::Serialization { .. } => ErrorKind::Serialization,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Returns the innermost error, without context wrappers.
    pub fn root(&self) -> &ParleyError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this is a CorruptRecord error
    pub fn is_corrupt(&self) -> bool {
        self.kind() == ErrorKind::CorruptRecord
    }

    /// Check if this is a StorageIo error
    pub fn is_storage_io(&self) -> bool {
        self.kind() == ErrorKind::StorageIo
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ParleyError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageIo {
            operation: "io",
            target: String::new(),
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("TOML parse error: {}", err))
    }
}

/// A type alias for `Result<T, ParleyError>`.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_context() {
        let err = ParleyError::session_not_found("abc")
            .context("load")
            .context("switch");

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
        assert!(matches!(err.root(), ParleyError::NotFound { id, .. } if id == "abc"));
    }

    #[test]
    fn test_context_message_keeps_inner_text() {
        let err = ParleyError::InvalidBranchPoint { index: 6, len: 5 }.context("branch");
        let text = err.to_string();
        assert!(text.starts_with("branch failed"));
        assert!(text.contains("Invalid branch point 6"));
    }

    #[test]
    fn test_io_error_maps_to_storage_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ParleyError = io.into();
        assert!(err.is_storage_io());
    }
}
