//! Timer Event Dispatch
//!
//! Turns a user `sigevent` into the notification a timer performs on
//! expiry, and performs it.
//!
//! There are no threads or signals below this subsystem, so `SIGEV_THREAD`
//! simply calls the given function in the context that processes the
//! expiry. Signal and thread-id delivery are refused when the timer is
//! created rather than dropped when it fires.

use alloc::sync::Arc;
use core::fmt;

use log::warn;

use super::TimerSubsystem;
use crate::error::{TimerError, TimerResult};
use crate::types::SigVal;

// ============================================================================
// Notification Kinds
// ============================================================================

/// Deliver a signal (unsupported)
pub const SIGEV_SIGNAL: i32 = 0;
/// No notification
pub const SIGEV_NONE: i32 = 1;
/// Call `function` with `value`
pub const SIGEV_THREAD: i32 = 2;
/// Deliver a signal to a specific thread (unsupported)
pub const SIGEV_THREAD_ID: i32 = 4;
/// Kernel internal: resume a sleeping caller
pub const SIGEV_WAKE_THREAD: i32 = 5;

/// Action run when a timer expires
///
/// Actions receive the subsystem so they can call back into the timer API,
/// e.g. to delete the timer that fired.
pub type TimerAction = Arc<dyn Fn(&TimerSubsystem, SigVal) + Send + Sync>;

/// Timer expiration request as supplied by the user (POSIX `sigevent`)
#[derive(Clone)]
pub struct SigEvent {
    /// Notification kind (`SIGEV_*`)
    pub notify: i32,
    /// Value passed to `function`
    pub value: SigVal,
    /// Action for `SIGEV_THREAD`/`SIGEV_WAKE_THREAD`
    pub function: Option<TimerAction>,
}

impl SigEvent {
    /// Timer with no notification; it can only be polled
    pub fn none() -> Self {
        Self {
            notify: SIGEV_NONE,
            value: SigVal::default(),
            function: None,
        }
    }

    /// Timer that calls `function(value)` on expiry
    pub fn thread<F>(value: SigVal, function: F) -> Self
    where
        F: Fn(&TimerSubsystem, SigVal) + Send + Sync + 'static,
    {
        Self {
            notify: SIGEV_THREAD,
            value,
            function: Some(Arc::new(function)),
        }
    }

    /// Signal delivery request
    pub fn signal(signo: i32) -> Self {
        Self {
            notify: SIGEV_SIGNAL,
            value: SigVal::from_int(signo),
            function: None,
        }
    }
}

impl fmt::Debug for SigEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigEvent")
            .field("notify", &self.notify)
            .field("value", &self.value)
            .field("function", &self.function.is_some())
            .finish()
    }
}

// ============================================================================
// Notification
// ============================================================================

/// What a timer does when it fires
#[derive(Clone)]
pub enum Notification {
    /// Nothing; the timer exists to be polled
    None,
    /// Invoke `action` with `value`
    Callback { action: TimerAction, value: SigVal },
}

impl Notification {
    /// Validate a user `sigevent`
    pub fn from_sigevent(event: &SigEvent) -> TimerResult<Self> {
        match event.notify {
            SIGEV_NONE => Ok(Self::None),
            SIGEV_THREAD | SIGEV_WAKE_THREAD => match &event.function {
                Some(action) => Ok(Self::Callback {
                    action: Arc::clone(action),
                    value: event.value,
                }),
                None => Err(TimerError::InvalidArgument),
            },
            SIGEV_SIGNAL | SIGEV_THREAD_ID => {
                warn!("timer: notification kind {} not supported", event.notify);
                Err(TimerError::Unsupported)
            }
            _ => Err(TimerError::InvalidArgument),
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback { .. })
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Callback { value, .. } => f.debug_struct("Callback").field("value", value).finish(),
        }
    }
}

/// Perform a fired timer's notification
///
/// Must be called without the timer state lock held: the action may
/// re-enter the timer API.
pub fn dispatch(timers: &TimerSubsystem, notification: &Notification) {
    match notification {
        Notification::None => {}
        Notification::Callback { action, value } => action(timers, *value),
    }
}
