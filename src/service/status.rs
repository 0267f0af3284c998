//! Service status and atomic state tracking.

use std::sync::atomic::{AtomicU8, Ordering};

/// Represents the current lifecycle status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Service has been constructed but not initialized.
    New,

    /// Service has been initialized and may be started.
    Initialized,

    /// Service is running and accepting work.
    Running,

    /// Service is stopped; it may be started again.
    Stopped,

    /// Service has been shut down and cannot be restarted.
    Shutdown,
}

impl ServiceStatus {
    /// Returns `true` if the service may dispatch work in this state.
    #[must_use]
    pub fn is_run_allowed(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if the service is stopped or shut down.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped | Self::Shutdown)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Stopped,
            4 => Self::Shutdown,
            _ => Self::New,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Initialized => 1,
            Self::Running => 2,
            Self::Stopped => 3,
            Self::Shutdown => 4,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Atomic holder for a [`ServiceStatus`].
///
/// Lets shared services track lifecycle state behind `&self` without locks;
/// the failover dispatch path polls this before every attempt.
#[derive(Debug)]
pub struct ServiceState {
    status: AtomicU8,
}

impl ServiceState {
    /// Creates a new state holder in the `New` status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(ServiceStatus::New.as_u8()),
        }
    }

    /// Loads the current status.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Stores a new status.
    pub fn set(&self, status: ServiceStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Returns `true` if work may currently be dispatched.
    #[must_use]
    pub fn is_run_allowed(&self) -> bool {
        self.status().is_run_allowed()
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_run_allowed() {
        assert!(ServiceStatus::Running.is_run_allowed());
        assert!(!ServiceStatus::New.is_run_allowed());
        assert!(!ServiceStatus::Initialized.is_run_allowed());
        assert!(!ServiceStatus::Stopped.is_run_allowed());
        assert!(!ServiceStatus::Shutdown.is_run_allowed());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ServiceStatus::Running.to_string(), "running");
        assert_eq!(ServiceStatus::Shutdown.to_string(), "shutdown");
    }

    #[test]
    fn test_state_transitions() {
        let state = ServiceState::new();
        assert_eq!(state.status(), ServiceStatus::New);
        assert!(!state.is_run_allowed());

        state.set(ServiceStatus::Initialized);
        assert_eq!(state.status(), ServiceStatus::Initialized);

        state.set(ServiceStatus::Running);
        assert!(state.is_run_allowed());

        state.set(ServiceStatus::Stopped);
        assert!(state.status().is_stopped());
    }
}
