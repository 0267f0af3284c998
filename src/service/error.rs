//! Service error types and result aliases.

use thiserror::Error;

/// Result type alias for service lifecycle operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur during service lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Service failed to initialize.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// Service failed to start.
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Service failed to stop gracefully.
    #[error("stop failed: {0}")]
    StopFailed(String),

    /// Service is in an invalid state for the requested operation.
    #[error("invalid state: current={current}, expected={expected}")]
    InvalidState {
        /// Current state of the service.
        current: String,
        /// Expected state for the operation.
        expected: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
