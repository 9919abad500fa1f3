//! Clocks and sleep
//!
//! Clock reads and adjustment, and `clock_nanosleep`: a blocking wait made
//! of one ephemeral timer and a wait-for-interrupt loop.
//!
//! A sleep ends one of two ways. Either its timer fires and the wake action
//! reports success, or an interrupt handler calls
//! [`TimerSubsystem::interrupt_sleep`], which reports the time that was
//! still left. Both paths delete the ephemeral timer.

use alloc::sync::Arc;

use log::{debug, info};
use spin::Mutex;

use super::event::{Notification, TimerAction};
use super::kobject::KobjectType;
use super::{TimerHandle, TimerSubsystem};
use crate::error::{TimerError, TimerResult};
use crate::types::{ClockId, ITimerSpec, SigVal, TimeSpec, TimerFlags};

// ============================================================================
// Clocks
// ============================================================================

impl TimerSubsystem {
    /// Read a clock
    pub fn clock_gettime(&self, clock: ClockId) -> TimeSpec {
        self.platform.get_time(clock)
    }

    /// Set an adjustable clock
    ///
    /// Deadlines on that clock keep their absolute values, so the countdown
    /// is reprogrammed against the new time.
    pub fn clock_settime(&self, clock: ClockId, time: TimeSpec) -> TimerResult<()> {
        if !clock.is_adjustable() || !time.is_valid() {
            return Err(TimerError::InvalidArgument);
        }

        let state = self.lock_state();
        self.platform.set_time(clock, time);
        self.reprogram(&state);
        info!("clock: {} set to {}", clock.name(), time);
        Ok(())
    }
}

// ============================================================================
// Sleep
// ============================================================================

#[derive(Debug, Default)]
struct SleepState {
    /// Ephemeral timer while a sleep is pending
    timer: Option<TimerHandle>,
    woken: bool,
    error: Option<TimerError>,
    /// Time left when the last sleep ended
    remaining: TimeSpec,
}

/// Sleep context owned by the caller
///
/// Clones share the same state, so an interrupt handler can hold one to
/// cancel the owner's sleep.
#[derive(Debug, Clone, Default)]
pub struct SleepHandle {
    inner: Arc<Mutex<SleepState>>,
}

impl SleepHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a sleep in progress on this handle?
    pub fn is_pending(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    /// Time left when the last sleep ended (zero if it completed)
    pub fn remaining(&self) -> TimeSpec {
        self.inner.lock().remaining
    }
}

impl TimerSubsystem {
    /// Block until `request` has passed on `clock` (or, with `ABSTIME`,
    /// until `clock` reaches `request`)
    ///
    /// Returns `Interrupted` with the time left if the sleep was cancelled.
    /// Only one sleep may be pending per handle.
    pub fn clock_nanosleep(
        &self,
        sleeper: &SleepHandle,
        clock: ClockId,
        flags: TimerFlags,
        request: TimeSpec,
    ) -> TimerResult<()> {
        if !request.is_valid() || request.is_zero() {
            return Err(TimerError::InvalidArgument);
        }
        if sleeper.is_pending() {
            return Err(TimerError::Busy);
        }
        // nothing would ever wake us
        if !self.feature_enabled() {
            return Err(TimerError::Unsupported);
        }

        let wake = sleeper.clone();
        let action: TimerAction =
            Arc::new(move |timers: &TimerSubsystem, _value: SigVal| timers.wake_up(&wake));
        let notification = Notification::Callback {
            action,
            value: SigVal::default(),
        };
        let timer = self.create_timer(clock, notification, KobjectType::SleepTimer)?;
        *sleeper.inner.lock() = SleepState {
            timer: Some(timer),
            ..SleepState::default()
        };

        if let Err(e) = self.timer_settime(timer, flags, &ITimerSpec::one_shot(request)) {
            sleeper.inner.lock().timer = None;
            self.timer_delete(timer)?;
            return Err(e);
        }
        debug!("sleep: {:?} for {} on {}", timer.id, request, clock.name());

        loop {
            let woken = sleeper.inner.lock().woken;
            if woken {
                break;
            }
            // switched off mid-sleep: the countdown is gone
            if !self.feature_enabled() {
                self.cancel_sleep(sleeper, |_| TimerError::Unsupported)?;
                break;
            }
            self.wait_for_interrupt();
        }

        match sleeper.inner.lock().error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wake action of a sleep timer
    fn wake_up(&self, sleeper: &SleepHandle) {
        let timer = {
            let mut state = sleeper.inner.lock();
            state.remaining = TimeSpec::ZERO;
            state.error = None;
            state.woken = true;
            state.timer.take()
        };

        if let Some(timer) = timer {
            if let Err(e) = self.timer_delete(timer) {
                panic!("sleep: cannot delete expired sleep timer: {}", e);
            }
            debug!("sleep: {:?} completed", timer.id);
        }
    }

    /// Cancel the sleep pending on `sleeper`
    ///
    /// Intended to be called from an interrupt handler while the owner is
    /// blocked in [`TimerSubsystem::clock_nanosleep`].
    pub fn interrupt_sleep(&self, sleeper: &SleepHandle) -> TimerResult<()> {
        self.cancel_sleep(sleeper, |remaining| TimerError::Interrupted { remaining })
    }

    /// End a pending sleep early with `error(remaining)` as its outcome
    fn cancel_sleep<F>(&self, sleeper: &SleepHandle, error: F) -> TimerResult<()>
    where
        F: FnOnce(TimeSpec) -> TimerError,
    {
        let Some(timer) = sleeper.inner.lock().timer else {
            return Err(TimerError::InvalidArgument);
        };

        let remaining = self.timer_gettime(timer)?.value;
        self.timer_delete(timer)?;

        let mut state = sleeper.inner.lock();
        state.timer = None;
        state.remaining = remaining;
        state.error = Some(error(remaining));
        state.woken = true;
        debug!("sleep: {:?} cancelled, {} left", timer.id, remaining);
        Ok(())
    }
}
