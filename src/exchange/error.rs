//! Failure classification for exchanges.
//!
//! Processors report failures as a [`ProcessingError`] carried in the
//! exchange's error slot. Every error belongs to an [`ErrorClass`] arranged
//! in an explicit supertype chain, so failover policies can match a failure
//! against declared classes by class or superclass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a processing failure.
///
/// Classes form a tree rooted at [`ErrorClass::Failure`]; [`ErrorClass::is_a`]
/// walks the parent chain. A declared failover filter matches an error whose
/// class equals a declared class or descends from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Root of the classification tree; matches every failure.
    Failure,
    /// I/O failure talking to a downstream processor.
    Io,
    /// Timed out waiting for a downstream processor.
    Timeout,
    /// Connection reset by a downstream processor.
    ConnectionReset,
    /// Downstream processor violated its protocol.
    Protocol,
    /// Application-level failure inside a processor.
    Application,
    /// Work unit rejected by validation.
    Validation,
    /// Execution rejected because the balancer is no longer allowed to run.
    Rejected,
}

impl ErrorClass {
    /// Returns the direct superclass, or `None` for the root.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Failure => None,
            Self::Io | Self::Protocol | Self::Application | Self::Rejected => Some(Self::Failure),
            Self::Timeout | Self::ConnectionReset => Some(Self::Io),
            Self::Validation => Some(Self::Application),
        }
    }

    /// Returns `true` if this class equals `ancestor` or descends from it.
    #[must_use]
    pub fn is_a(self, ancestor: Self) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class == ancestor {
                return true;
            }
            current = class.parent();
        }
        false
    }

    /// Returns the kebab-case name of this class.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::Io => "io",
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection-reset",
            Self::Protocol => "protocol",
            Self::Application => "application",
            Self::Validation => "validation",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified failure carried in an exchange's error slot.
#[derive(Debug, Clone, Error)]
#[error("{class}: {message}")]
pub struct ProcessingError {
    class: ErrorClass,
    message: String,
}

impl ProcessingError {
    /// Creates a new error with the given classification.
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
