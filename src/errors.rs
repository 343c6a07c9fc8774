//! Error types for object storage operations
//!
//! Every operation on the storage contract fails with a [`StorageError`].
//! Backend-specific failures are translated exactly once, at the adapter
//! boundary, so callers can match on the variant without knowing which
//! store is behind it.

use thiserror::Error;

use crate::storage::BackendError;

/// Main error type for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend session could not be established
    #[error("Connection setup error: {0}")]
    ConnectionSetup(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No object exists at the requested path
    #[error("{path} does not exist in bucket {bucket}, code: {code}")]
    NotExist {
        path: String,
        bucket: String,
        code: String,
    },

    /// Reading the caller's content stream failed
    #[error("Read error: {0}")]
    Read(#[source] std::io::Error),

    /// Any other backend or transport failure
    #[error("Backend I/O error: {0}")]
    Backend(#[source] BackendError),

    /// The caller's context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl StorageError {
    /// Whether this is the "object absent" sentinel.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, StorageError::NotExist { .. })
    }

    /// Whether the operation stopped because its context was cancelled or expired.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StorageError::Cancelled | StorageError::DeadlineExceeded)
    }

    /// Stable short name, used as a metrics label and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::ConnectionSetup(_) => "connection_setup",
            StorageError::Config(_) => "config",
            StorageError::NotExist { .. } => "not_exist",
            StorageError::Read(_) => "read",
            StorageError::Backend(_) => "backend",
            StorageError::Cancelled => "cancelled",
            StorageError::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StorageError>;
