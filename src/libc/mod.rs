//! POSIX-facing definitions shared with user programs

pub mod errno;
