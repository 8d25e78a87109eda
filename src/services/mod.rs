/// Question countdown task.
pub mod countdown;
/// Health check service.
pub mod health_service;
/// Session lifecycle, board and answer operations.
pub mod session_service;
