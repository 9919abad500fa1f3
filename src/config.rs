//! Timer subsystem configuration
//!
//! Boot-time knobs for the timer subsystem, in the spirit of Mach's
//! `machine_info`: capacity of the control block zone, the timers feature
//! switch and the expiry coalescing threshold.

use crate::kern::timer_zone::TIMER_ZONE_MAX;
use crate::types::TimeSpec;

/// Timer subsystem configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Maximum number of live timers (clamped to `TIMER_ZONE_MAX`)
    pub max_timers: usize,
    /// Timers feature switch; while off the countdown is never programmed
    pub timers_enabled: bool,
    /// Expiry coalescing threshold; `None` derives it from the hardware
    /// minimum interval
    pub slack: Option<TimeSpec>,
}

impl TimerConfig {
    pub const fn new() -> Self {
        Self {
            max_timers: TIMER_ZONE_MAX,
            timers_enabled: true,
            slack: None,
        }
    }

    pub const fn with_max_timers(mut self, max_timers: usize) -> Self {
        self.max_timers = max_timers;
        self
    }

    pub const fn with_timers_enabled(mut self, enabled: bool) -> Self {
        self.timers_enabled = enabled;
        self
    }

    pub const fn with_slack(mut self, slack: TimeSpec) -> Self {
        self.slack = Some(slack);
        self
    }

    /// Effective control block zone capacity
    pub fn zone_capacity(&self) -> usize {
        self.max_timers.min(TIMER_ZONE_MAX)
    }

    /// Coalescing threshold: deadlines within this distance of "now" are
    /// treated as due in the same scheduler pass.
    ///
    /// Defaults to half of the finest interval the hardware can program.
    pub fn slack_for(&self, min_interval: TimeSpec) -> TimeSpec {
        self.slack.unwrap_or_else(|| min_interval.half())
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::new()
    }
}
