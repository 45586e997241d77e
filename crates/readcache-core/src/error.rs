//! Error types for the read cache
//!
//! The cache distinguishes errors that are surfaced to the caller
//! (validation, missing context, cancellation) from internal failures that
//! the decision engine degrades to baseline output. Internal kinds never
//! escape `DecisionEngine::read`.

use thiserror::Error;

/// Result type alias for read-cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Error type for read-cache operations
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Invalid caller input, surfaced as a validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool was invoked without a host-provided session context
    #[error("read cache requires a host-provided session context")]
    MissingContext,

    /// The operation was cancelled through the cooperative signal
    #[error("operation aborted")]
    Aborted,

    /// Object store failure; fail-open on decision paths
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Filesystem failure; fail-open on decision paths
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// Serialization failure; fail-open on decision paths
    #[error("JSON error: {0}")]
    Json(String),
}

impl CacheError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an IO error without a path
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
        }
    }

    /// Create an IO error carrying the offending path
    pub fn io_at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Whether this error must reach the caller instead of degrading to
    /// baseline output
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::MissingContext | Self::Aborted
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaced_kinds() {
        assert!(CacheError::InvalidInput("bad range".into()).is_surfaced());
        assert!(CacheError::MissingContext.is_surfaced());
        assert!(CacheError::Aborted.is_surfaced());
        assert!(!CacheError::storage("disk full").is_surfaced());
        assert!(!CacheError::io("unreadable").is_surfaced());
    }

    #[test]
    fn io_error_carries_path() {
        let err = CacheError::io_at("denied", "/tmp/x");
        match err {
            CacheError::Io { path, .. } => assert_eq!(path.as_deref(), Some("/tmp/x")),
            _ => panic!("expected io error"),
        }
    }
}
