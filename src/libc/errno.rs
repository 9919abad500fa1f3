//! POSIX errno.h - error codes

use crate::error::TimerError;

pub const ESUCCESS: i32 = 0; // No error
pub const ENOENT: i32 = 2; // No such file or directory
pub const EINTR: i32 = 4; // Interrupted system call
pub const ENOMEM: i32 = 12; // Out of memory
pub const EBUSY: i32 = 16; // Device or resource busy
pub const EINVAL: i32 = 22; // Invalid argument
pub const ENOTSUP: i32 = 95; // Operation not supported

impl TimerError {
    /// Convert TimerError to POSIX errno value
    pub fn to_errno(&self) -> i32 {
        match self {
            TimerError::InvalidArgument => EINVAL,
            TimerError::NotFound => ENOENT,
            TimerError::Unsupported => ENOTSUP,
            TimerError::OutOfMemory => ENOMEM,
            TimerError::Interrupted { .. } => EINTR,
            TimerError::Busy => EBUSY,
        }
    }
}

/// Errno for an operation result (0 on success)
pub fn errno_of<T>(result: &Result<T, TimerError>) -> i32 {
    match result {
        Ok(_) => ESUCCESS,
        Err(e) => e.to_errno(),
    }
}
