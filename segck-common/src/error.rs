//! Common error types for the segment checker

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for segment checker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the annotation core and the server
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or annotation data could not be loaded or failed validation.
    /// Fatal at startup.
    #[error("Load error: {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// Segment is held by a user (possibly the requester)
    #[error("{id} is already locked by user {by}")]
    AlreadyLocked { id: String, by: String },

    /// Unlock of a segment nobody holds
    #[error("{0} is not locked")]
    NotLocked(String),

    /// Unlock by a user who is not the holder
    #[error("{id} is not locked by user {user}")]
    NotOwner { id: String, user: String },

    /// Requested segment does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Absolute request index could not be resolved
    #[error("invalid request index: {0}")]
    InvalidIndex(String),

    /// Status filter entry that cannot be interpreted
    #[error("invalid status filter: {0:?}")]
    InvalidStatusFilter(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Annotation write to disk failed. The in-memory copy is kept.
    #[error("failed to persist annotation {id}: {source}")]
    Persist {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a fatal load error on `path`
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the request itself rather than by the server.
    /// These go back to the client as an error payload.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyLocked { .. }
                | Error::NotLocked(_)
                | Error::NotOwner { .. }
                | Error::NotFound(_)
                | Error::InvalidIndex(_)
                | Error::InvalidStatusFilter(_)
                | Error::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_errors_are_client_errors() {
        let err = Error::AlreadyLocked {
            id: "a".to_string(),
            by: "u1".to_string(),
        };
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "a is already locked by user u1");
        assert!(Error::NotLocked("a".to_string()).is_client_error());
    }

    #[test]
    fn test_persist_error_is_not_client_error() {
        let err = Error::Persist {
            id: "a".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("failed to persist annotation a"));
    }

    #[test]
    fn test_load_error_names_file() {
        let err = Error::load("/tmp/source/x.json", "no id");
        assert_eq!(err.to_string(), "Load error: /tmp/source/x.json: no id");
    }
}
