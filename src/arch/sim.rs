//! Simulated platform
//!
//! A deterministic stand-in for the timer hardware: time only moves when the
//! simulated CPU is suspended (it jumps to the next interrupt) or when the
//! owner advances it explicitly, e.g. to model a slow callback.
//!
//! The realtime clock is derived from the monotonic one plus an offset that
//! `set_time(Realtime, ..)` rewrites, so both domains advance together.

use alloc::vec::Vec;
use spin::Mutex;

use super::{Irq, Platform};
use crate::kern::TimerSubsystem;
use crate::types::{ClockId, TimeSpec};

/// Realtime clock value at simulated boot
pub const DEFAULT_BOOT_REALTIME: TimeSpec = TimeSpec::from_secs(1_700_000_000);

/// Default countdown granularity
pub const DEFAULT_MIN_INTERVAL: TimeSpec = TimeSpec::from_millis(1);

#[derive(Debug)]
struct SimState {
    /// Monotonic time since boot
    monotonic: TimeSpec,
    /// Realtime value at `realtime_mark`
    realtime_base: TimeSpec,
    /// Monotonic time at which `realtime_base` was recorded
    realtime_mark: TimeSpec,
    /// Absolute monotonic expiry of the armed countdown
    countdown: Option<TimeSpec>,
    /// Scheduled external interrupts, ordered by monotonic time
    pending: Vec<(TimeSpec, Irq)>,
    min_interval: TimeSpec,
    interrupts_enabled: bool,
    initialized: bool,
    /// Times the countdown has been programmed
    programs: u64,
}

/// Software timer hardware
#[derive(Debug)]
pub struct SimPlatform {
    state: Mutex<SimState>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_BOOT_REALTIME, DEFAULT_MIN_INTERVAL)
    }

    pub fn with_config(boot_realtime: TimeSpec, min_interval: TimeSpec) -> Self {
        Self {
            state: Mutex::new(SimState {
                monotonic: TimeSpec::ZERO,
                realtime_base: boot_realtime,
                realtime_mark: TimeSpec::ZERO,
                countdown: None,
                pending: Vec::new(),
                min_interval,
                interrupts_enabled: false,
                initialized: false,
                programs: 0,
            }),
        }
    }

    /// Current monotonic time
    pub fn now(&self) -> TimeSpec {
        self.state.lock().monotonic
    }

    /// Let `by` pass without delivering any interrupt
    pub fn advance(&self, by: TimeSpec) {
        let mut state = self.state.lock();
        state.monotonic = state.monotonic.saturating_add(by);
    }

    /// Move the monotonic clock forward to `at` (never backwards)
    pub fn advance_to(&self, at: TimeSpec) {
        let mut state = self.state.lock();
        if at > state.monotonic {
            state.monotonic = at;
        }
    }

    /// Schedule an external interrupt at monotonic time `at`
    pub fn raise_at(&self, at: TimeSpec, irq: Irq) {
        let mut state = self.state.lock();
        let pos = state.pending.partition_point(|&(t, _)| t <= at);
        state.pending.insert(pos, (at, irq));
    }

    /// Monotonic expiry of the armed countdown, if any
    pub fn countdown(&self) -> Option<TimeSpec> {
        self.state.lock().countdown
    }

    /// Times the countdown has been programmed since boot
    pub fn countdown_programs(&self) -> u64 {
        self.state.lock().programs
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Monotonic time of the next interrupt from any source
    pub fn next_event(&self) -> Option<TimeSpec> {
        let state = self.state.lock();
        let external = state.pending.first().map(|&(t, _)| t);
        match (state.countdown, external) {
            (Some(c), Some(e)) => Some(c.min(e)),
            (c, e) => c.or(e),
        }
    }

    /// Run the simulated CPU idle until monotonic time `until`, delivering
    /// every interrupt that falls due on the way to `timers`.
    pub fn run_until(&self, timers: &TimerSubsystem, until: TimeSpec) {
        while let Some(at) = self.next_event() {
            if at > until {
                break;
            }
            timers.wait_for_interrupt();
        }
        self.advance_to(until);
    }

    /// Run for `duration` of monotonic time from now
    pub fn run_for(&self, timers: &TimerSubsystem, duration: TimeSpec) {
        let until = self.now().saturating_add(duration);
        self.run_until(timers, until);
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimPlatform {
    fn timer_init(&self) {
        let mut state = self.state.lock();
        state.countdown = None;
        state.initialized = true;
    }

    fn timer_set(&self, interval: TimeSpec) {
        let mut state = self.state.lock();
        state.countdown = Some(state.monotonic.saturating_add(interval));
        state.programs += 1;
    }

    fn timer_cancel(&self) {
        self.state.lock().countdown = None;
    }

    fn get_time(&self, clock: ClockId) -> TimeSpec {
        let state = self.state.lock();
        match clock {
            ClockId::Monotonic => state.monotonic,
            ClockId::Realtime => state
                .realtime_base
                .saturating_add(state.monotonic.saturating_sub(state.realtime_mark)),
        }
    }

    fn set_time(&self, clock: ClockId, time: TimeSpec) {
        let mut state = self.state.lock();
        match clock {
            ClockId::Realtime => {
                state.realtime_base = time;
                state.realtime_mark = state.monotonic;
            }
            ClockId::Monotonic => panic!("monotonic clock cannot be set"),
        }
    }

    fn min_interval(&self) -> TimeSpec {
        self.state.lock().min_interval
    }

    fn interrupts_enabled(&self) -> bool {
        self.state.lock().interrupts_enabled
    }

    fn enable_interrupts(&self) {
        self.state.lock().interrupts_enabled = true;
    }

    fn disable_interrupts(&self) {
        self.state.lock().interrupts_enabled = false;
    }

    fn suspend(&self) -> Irq {
        let mut state = self.state.lock();
        debug_assert!(state.interrupts_enabled, "suspend with interrupts disabled");

        let external = state.pending.first().copied();
        let (at, irq) = match (state.countdown, external) {
            // the countdown wins ties
            (Some(c), Some((e, irq))) if e < c => {
                state.pending.remove(0);
                (e, irq)
            }
            (Some(c), _) => {
                state.countdown = None;
                (c, Irq::Timer)
            }
            (None, Some((e, irq))) => {
                state.pending.remove(0);
                (e, irq)
            }
            (None, None) => panic!("simulated CPU suspended with no interrupt source"),
        };

        if at > state.monotonic {
            state.monotonic = at;
        }
        irq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clocks_advance_together() {
        let sim = SimPlatform::with_config(TimeSpec::from_secs(100), DEFAULT_MIN_INTERVAL);
        sim.advance(TimeSpec::from_secs(2));
        assert_eq!(sim.get_time(ClockId::Monotonic), TimeSpec::from_secs(2));
        assert_eq!(sim.get_time(ClockId::Realtime), TimeSpec::from_secs(102));

        sim.set_time(ClockId::Realtime, TimeSpec::from_secs(50));
        sim.advance(TimeSpec::from_secs(1));
        assert_eq!(sim.get_time(ClockId::Realtime), TimeSpec::from_secs(51));
        assert_eq!(sim.get_time(ClockId::Monotonic), TimeSpec::from_secs(3));
    }

    #[test]
    fn test_suspend_picks_earliest_source() {
        let sim = SimPlatform::new();
        sim.enable_interrupts();
        sim.timer_set(TimeSpec::from_secs(5));
        sim.raise_at(TimeSpec::from_secs(3), Irq::External(1));

        assert_eq!(sim.next_event(), Some(TimeSpec::from_secs(3)));
        assert_eq!(sim.suspend(), Irq::External(1));
        assert_eq!(sim.now(), TimeSpec::from_secs(3));

        assert_eq!(sim.suspend(), Irq::Timer);
        assert_eq!(sim.now(), TimeSpec::from_secs(5));
        assert_eq!(sim.countdown(), None);
        assert_eq!(sim.next_event(), None);
    }

    #[test]
    fn test_countdown_replaced() {
        let sim = SimPlatform::new();
        sim.timer_set(TimeSpec::from_secs(5));
        sim.timer_set(TimeSpec::from_secs(1));
        assert_eq!(sim.countdown(), Some(TimeSpec::from_secs(1)));
        assert_eq!(sim.countdown_programs(), 2);
        sim.timer_cancel();
        assert_eq!(sim.countdown(), None);
    }
}
