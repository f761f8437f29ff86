use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or rejected the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Backend-specific description.
        message: String,
        /// Underlying driver error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored record could not be decoded into the expected shape.
    #[error("corrupt record `{key}`: {reason}")]
    Corrupt {
        /// Identifier of the offending record.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corrupt-record error.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
