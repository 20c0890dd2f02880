use thiserror::Error;

/// Failures reported by a contact-store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing medium could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored data could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// The store refused the record.
    #[error("record rejected: {0}")]
    Rejected(String),
    /// The store is temporarily unavailable (lock poisoned, closed handle).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
