use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by snapshot storage backends regardless of where the bytes live.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable for `{key}`: {message}")]
    Unavailable {
        key: String,
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        key: impl Into<String>,
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            key: key.into(),
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// Failures reading or writing a session snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The backend could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The stored record is not a structurally valid snapshot.
    #[error("snapshot corrupt: {0}")]
    Corrupt(String),
    /// The snapshot could not be serialized.
    #[error("failed to encode snapshot")]
    Encode(#[source] serde_json::Error),
}
