//! Error taxonomy for scheduling operations.
//!
//! Every fallible domain or storage operation returns [`ScheduleResult`].
//! The API layer maps these variants onto HTTP status codes.

use thiserror::Error;

/// Master error type for scheduling operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// A request or entity failed validation (bad interval, overlap,
    /// illegal status transition, invalid date range, ...).
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// The entity exists but does not belong to the requesting user.
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    /// The operation conflicts with current state
    /// (proposed plan already exists, optimistic lock failure, ...).
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Illegal state-machine transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A split point that would produce an undersized or empty part.
    #[error("invalid split point")]
    InvalidSplitPoint,

    /// Storage backend failure.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// The optimization executor reported a failure.
    #[error("executor error: {reason}")]
    Executor { reason: String },
}

impl ScheduleError {
    pub fn validation(reason: impl Into<String>) -> Self {
        ScheduleError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str) -> Self {
        ScheduleError::NotFound { entity }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        ScheduleError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        ScheduleError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        ScheduleError::Storage {
            reason: reason.into(),
        }
    }

    pub fn executor(reason: impl Into<String>) -> Self {
        ScheduleError::Executor {
            reason: reason.into(),
        }
    }
}

/// Result type alias for scheduling operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScheduleError::validation("events overlap within batch");
        assert_eq!(
            err.to_string(),
            "validation failed: events overlap within batch"
        );

        let err = ScheduleError::not_found("schedule plan");
        assert_eq!(err.to_string(), "schedule plan not found");
    }
}
