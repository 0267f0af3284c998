//! Balancer error types.

use thiserror::Error;

/// Errors that can occur constructing or dispatching through a balancer.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// No processors are registered.
    #[error("no processors available in balancer '{0}'")]
    NoProcessorsAvailable(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Balancer is not accepting work.
    #[error("execution rejected: balancer is not running")]
    NotRunning,
}

/// Result type for balancer operations.
pub type BalancerResult<T> = Result<T, BalancerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BalancerError::NoProcessorsAvailable("failover".to_string());
        assert_eq!(
            err.to_string(),
            "no processors available in balancer 'failover'"
        );

        let err = BalancerError::NotRunning;
        assert_eq!(err.to_string(), "execution rejected: balancer is not running");
    }
}
