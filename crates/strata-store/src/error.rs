/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record is stored under the requested key.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The key cannot be used by this backend.
    #[error("invalid record key: {0:?}")]
    InvalidKey(String),

    /// The stored record failed framing or checksum validation.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by a custom storage medium.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
