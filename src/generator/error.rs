//! Error types shared by the question-generation and answer-grading transports.

use std::error::Error;

use thiserror::Error;

/// Convenient result alias returning [`UpstreamError`] failures.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Failures that can occur while talking to the generation or grading service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The service could not be reached.
    #[error("upstream service unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The service answered with a non-success status code.
    #[error("upstream service returned status {status}")]
    Status { status: u16 },
    /// The service answered, but the payload does not match the contract.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    /// The request did not complete in time.
    #[error("upstream request timed out")]
    Timeout,
}

impl UpstreamError {
    /// Construct an unavailable error from any transport failure.
    pub fn unavailable(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        UpstreamError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Construct a contract violation error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        UpstreamError::Malformed(reason.into())
    }
}
