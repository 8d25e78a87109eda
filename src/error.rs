use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::{SnapshotError, StorageError},
    generator::error::UpstreamError,
    state::{
        session::TransitionError,
        state_machine::{AbortError, ApplyError, GuardViolation, PlanError},
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The question generator failed or answered outside its contract.
    #[error("question generation failed")]
    GenerationFailure(#[source] UpstreamError),
    /// The answer grader failed or answered outside its contract.
    #[error("answer grading failed")]
    GradingFailure(#[source] UpstreamError),
    /// The requested board cell cannot be played.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    /// An answer was submitted while no question is on screen.
    #[error("no question is active")]
    NoActiveQuestion,
    /// Another session operation is still running.
    #[error("another session operation is in progress")]
    OperationInProgress,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Snapshot storage failed.
    #[error("snapshot storage failed")]
    Storage(#[from] SnapshotError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Storage(SnapshotError::Storage(err))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// An upstream service failed.
    #[error("bad gateway: {0}")]
    BadGateway(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::GenerationFailure(source) => {
                AppError::BadGateway(format!("question generation failed: {source}"))
            }
            ServiceError::GradingFailure(source) => {
                AppError::BadGateway(format!("answer grading failed: {source}"))
            }
            ServiceError::InvalidSelection(message) | ServiceError::InvalidInput(message) => {
                AppError::BadRequest(message)
            }
            err @ (ServiceError::NoActiveQuestion | ServiceError::OperationInProgress) => {
                AppError::Conflict(err.to_string())
            }
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::Storage(SnapshotError::Corrupt(reason)) => {
                AppError::Internal(format!("snapshot corrupt: {reason}"))
            }
            ServiceError::Storage(source) => AppError::ServiceUnavailable(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => ServiceError::OperationInProgress,
            PlanError::InvalidTransition(invalid) => {
                ServiceError::InvalidState(invalid.to_string())
            }
            PlanError::Guard(violation @ GuardViolation::CellUsed(_)) => {
                ServiceError::InvalidSelection(violation.to_string())
            }
            PlanError::Guard(violation @ GuardViolation::BoardIncomplete) => {
                ServiceError::InvalidState(violation.to_string())
            }
            PlanError::Guard(violation) => ServiceError::InvalidInput(violation.to_string()),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::InvalidState("no transition is pending".into()),
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending transition does not match".into())
            }
            ApplyError::PhaseMismatch { expected, actual } => ServiceError::InvalidState(format!(
                "state changed during transition (expected {expected:?}, got {actual:?})"
            )),
            ApplyError::VersionMismatch { expected, actual } => {
                ServiceError::InvalidState(format!(
                    "state version mismatch during transition (expected {expected}, got {actual})"
                ))
            }
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => ServiceError::InvalidState("no pending transition".into()),
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidState("transition plan does not match".into())
            }
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Plan(err) => err.into(),
            TransitionError::Apply(err) => err.into(),
        }
    }
}
