//! Error types for the timer subsystem using thiserror

use thiserror::Error;

use crate::types::TimeSpec;

/// Errors reported by timer, clock and sleep operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Null argument, unknown clock, malformed time value or notification
    #[error("invalid argument")]
    InvalidArgument,

    /// Handle no longer refers to a live timer
    #[error("no such timer")]
    NotFound,

    /// Notification style this kernel cannot deliver
    #[error("operation not supported")]
    Unsupported,

    /// Timer control block zone exhausted
    #[error("out of timer control blocks")]
    OutOfMemory,

    /// Sleep cancelled before its deadline
    #[error("sleep interrupted with {remaining} remaining")]
    Interrupted { remaining: TimeSpec },

    /// A sleep is already pending on this sleep handle
    #[error("sleep already pending")]
    Busy,
}

/// Result type for timer operations
pub type TimerResult<T> = Result<T, TimerError>;
