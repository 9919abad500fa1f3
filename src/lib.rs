//! ktimers - kernel timer subsystem
//!
//! POSIX-style timers for a single-core, interrupt-driven kernel: one
//! deadline-ordered expiry queue per clock domain multiplexed onto a single
//! hardware countdown, event dispatch on expiry, a blocking sleep built on
//! an ephemeral timer, and a syscall layer that validates every user handle
//! against the kernel object table.
//!
//! Hardware is reached only through [`arch::Platform`]; [`arch::sim`]
//! provides a deterministic software platform for hosted use and testing.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Standard library replacement for no_std
extern crate alloc;

// Core types
pub mod types;

pub mod arch;
pub mod config;
pub mod error;
pub mod kern;
pub mod libc;
pub mod syscall;

pub use arch::{Irq, IrqGuard, Platform};
pub use config::TimerConfig;
pub use error::{TimerError, TimerResult};
pub use kern::{
    SigEvent, SleepHandle, TimerHandle, TimerSubsystem, SIGEV_NONE, SIGEV_SIGNAL, SIGEV_THREAD,
    SIGEV_THREAD_ID,
};
pub use types::{ClockId, ITimerSpec, SigVal, TimeSpec, TimerFlags};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "ktimers";
