//! Timer Management
//!
//! Expiry queues and the POSIX timer operations built on them.
//!
//! Each clock domain has its own queue of armed timers ordered by absolute
//! deadline, ties kept in arming order. The single hardware countdown is
//! programmed for whichever queue head is nearest, each measured against
//! its own clock. When it fires, [`TimerSubsystem::tick`] pops every due
//! timer, re-arms periodic ones at `previous deadline + period`, and
//! dispatches their notifications with the timer lock released.

use heapless::Vec as HVec;
use log::{debug, trace};

use super::event::{dispatch, Notification, SigEvent};
use super::kobject::KobjectType;
use super::timer_zone::{ArmState, SlotIndex, TimerControlBlock, TIMER_ZONE_MAX};
use super::{TimerHandle, TimerState, TimerSubsystem};
use crate::error::{TimerError, TimerResult};
use crate::types::{ClockId, ITimerSpec, TimeSpec, TimerFlags};

// ============================================================================
// Expiry Queue
// ============================================================================

/// Queue entry: an armed timer and its absolute deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub deadline: TimeSpec,
    pub slot: SlotIndex,
}

/// Armed timers of one clock domain, ascending by deadline
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    entries: HVec<Expiry, TIMER_ZONE_MAX>,
}

impl ExpiryQueue {
    pub const fn new() -> Self {
        Self { entries: HVec::new() }
    }

    /// Insert behind every entry with an equal or earlier deadline
    ///
    /// Returns true if the entry became the new head.
    pub fn insert(&mut self, expiry: Expiry) -> bool {
        let pos = self
            .entries
            .partition_point(|e| e.deadline <= expiry.deadline);
        if self.entries.insert(pos, expiry).is_err() {
            panic!("timer: expiry queue overflow");
        }
        pos == 0
    }

    /// Unlink `slot`; returns whether it was the head, or `None` if absent
    pub fn remove(&mut self, slot: SlotIndex) -> Option<bool> {
        let pos = self.entries.iter().position(|e| e.slot == slot)?;
        self.entries.remove(pos);
        Some(pos == 0)
    }

    pub fn peek(&self) -> Option<&Expiry> {
        self.entries.first()
    }

    pub fn pop(&mut self) -> Option<Expiry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Pop the head if its deadline is at or before `limit`
    pub fn pop_due(&mut self, limit: TimeSpec) -> Option<Expiry> {
        match self.peek() {
            Some(head) if head.deadline <= limit => self.pop(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, slot: SlotIndex) -> bool {
        self.entries.iter().any(|e| e.slot == slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expiry> {
        self.entries.iter()
    }

    /// Ascending by deadline?
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].deadline <= w[1].deadline)
    }
}

/// First `previous + k * period` (k >= 1) strictly after `limit`
///
/// Missed periods are skipped rather than fired as a backlog.
fn next_deadline(previous: TimeSpec, period: TimeSpec, limit: TimeSpec) -> TimeSpec {
    let period_ns = period.as_nanos();
    let missed = limit.as_nanos().saturating_sub(previous.as_nanos()) / period_ns;
    let advance = period_ns.saturating_mul(missed + 1);
    TimeSpec::from_nanos(previous.as_nanos().saturating_add(advance))
}

// ============================================================================
// Queue Linkage
// ============================================================================

impl TimerState {
    /// Take an armed timer off its queue; returns whether the head changed
    pub fn unlink(&mut self, slot: SlotIndex) -> bool {
        let block = self.block_mut(slot);
        if !block.is_armed() {
            return false;
        }
        block.state = ArmState::Disarmed;
        let clock = block.clock;

        match self.queues[clock.index()].remove(slot) {
            Some(was_head) => was_head,
            None => panic!("timer: armed slot {:?} missing from {} queue", slot, clock.name()),
        }
    }

    /// Arm a disarmed timer at `itimer` (absolute deadline); returns whether
    /// the head changed
    pub fn link(&mut self, slot: SlotIndex, itimer: ITimerSpec) -> bool {
        let block = self.block_mut(slot);
        debug_assert!(!block.is_armed());
        block.itimer = itimer;
        block.state = ArmState::Armed;
        let clock = block.clock;

        self.queues[clock.index()].insert(Expiry {
            deadline: itimer.value,
            slot,
        })
    }
}

impl TimerControlBlock {
    /// Setting as seen by the user: time left until the deadline
    fn remaining(&self, now: TimeSpec) -> ITimerSpec {
        let value = if self.is_armed() {
            self.itimer.value.saturating_sub(now)
        } else {
            TimeSpec::ZERO
        };
        ITimerSpec::new(value, self.itimer.interval)
    }
}

// ============================================================================
// Timer Operations
// ============================================================================

impl TimerSubsystem {
    /// Create a disarmed timer on `clock`
    ///
    /// The notification is validated before anything is allocated.
    pub fn timer_create(&self, clock: ClockId, event: &SigEvent) -> TimerResult<TimerHandle> {
        let notification = Notification::from_sigevent(event)?;
        self.create_timer(clock, notification, KobjectType::Timer)
    }

    pub(crate) fn create_timer(
        &self,
        clock: ClockId,
        notification: Notification,
        kotype: KobjectType,
    ) -> TimerResult<TimerHandle> {
        let mut state = self.lock_state();
        let id = state.objects.alloc_id(kotype);
        let slot = match state.zone.alloc(TimerControlBlock::new(id, clock, notification)) {
            Ok(slot) => slot,
            Err(e) => {
                state.objects.free_id(id);
                debug!("timer: create failed, {}", e);
                return Err(e);
            }
        };

        debug!("timer: created {} {:?} on {}", kotype.name(), id, clock.name());
        Ok(TimerHandle { id, slot })
    }

    /// Destroy a timer, disarming it first
    pub fn timer_delete(&self, handle: TimerHandle) -> TimerResult<()> {
        let mut state = self.lock_state();
        let slot = state.resolve(handle)?;

        if state.unlink(slot) {
            self.reprogram(&state);
        }
        state.zone.free(slot);
        state.objects.free_id(handle.id);

        debug!("timer: deleted {:?}", handle.id);
        Ok(())
    }

    /// Arm, re-arm or (with a zero `value`) disarm a timer
    ///
    /// `value` is relative to the timer's clock unless `flags` has
    /// `ABSTIME`. Returns the previous setting, relative to now.
    pub fn timer_settime(
        &self,
        handle: TimerHandle,
        flags: TimerFlags,
        setting: &ITimerSpec,
    ) -> TimerResult<ITimerSpec> {
        if !setting.is_valid() {
            return Err(TimerError::InvalidArgument);
        }

        let mut state = self.lock_state();
        let slot = state.resolve(handle)?;
        let clock = state.block(slot).clock;
        let now = self.platform.get_time(clock);
        let previous = state.block(slot).remaining(now);

        let mut head_changed = state.unlink(slot);
        if setting.value.is_set() {
            let deadline = if flags.contains(TimerFlags::ABSTIME) {
                setting.value
            } else {
                now.saturating_add(setting.value)
            };
            head_changed |= state.link(slot, ITimerSpec::new(deadline, setting.interval));
            debug!(
                "timer: armed {:?} at {} period {}",
                handle.id, deadline, setting.interval
            );
        } else {
            state.block_mut(slot).itimer = ITimerSpec::disarmed();
            debug!("timer: disarmed {:?}", handle.id);
        }

        if head_changed {
            self.reprogram(&state);
        }
        Ok(previous)
    }

    /// Time left until expiry (zero when disarmed) and the period
    pub fn timer_gettime(&self, handle: TimerHandle) -> TimerResult<ITimerSpec> {
        let state = self.lock_state();
        let slot = state.resolve(handle)?;
        let block = state.block(slot);
        Ok(block.remaining(self.platform.get_time(block.clock)))
    }

    /// Disarm a timer without destroying it
    pub fn timer_disarm(&self, handle: TimerHandle) -> TimerResult<()> {
        self.timer_settime(handle, TimerFlags::RELATIVE, &ITimerSpec::disarmed())
            .map(|_| ())
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Countdown interrupt: fire every due timer in both clock domains
    pub fn tick(&self) {
        trace!("timer: tick");
        for clock in ClockId::ALL {
            self.expire(clock);
        }
        let state = self.lock_state();
        self.reprogram(&state);
    }

    /// Fire due timers of one domain, re-reading the clock after each
    /// notification
    fn expire(&self, clock: ClockId) {
        loop {
            let notification = {
                let mut guard = self.lock_state();
                let state = &mut *guard;
                if !state.enabled {
                    return;
                }

                let limit = self.platform.get_time(clock).saturating_add(self.slack);
                let Some(expiry) = state.queues[clock.index()].pop_due(limit) else {
                    return;
                };

                let block = match state.zone.get_mut(expiry.slot) {
                    Some(block) => block,
                    None => panic!("timer: queued slot {:?} has no control block", expiry.slot),
                };
                if block.is_periodic() {
                    let next = next_deadline(expiry.deadline, block.itimer.interval, limit);
                    block.itimer.value = next;
                    state.queues[clock.index()].insert(Expiry {
                        deadline: next,
                        slot: expiry.slot,
                    });
                } else {
                    block.state = ArmState::Disarmed;
                    block.itimer.value = TimeSpec::ZERO;
                }
                trace!("timer: fired {:?} due {}", block.id, expiry.deadline);
                let notification = block.notification.clone();

                // the next deadline is armed before the action runs
                self.reprogram(state);
                notification
            };

            dispatch(self, &notification);
        }
    }

    /// Program the countdown for the nearest queue head, or cancel it
    pub(crate) fn reprogram(&self, state: &TimerState) {
        if !state.enabled {
            self.platform.timer_cancel();
            return;
        }

        let next = ClockId::ALL
            .iter()
            .filter_map(|&clock| {
                let head = state.queues[clock.index()].peek()?;
                Some(head.deadline.saturating_sub(self.platform.get_time(clock)))
            })
            .min();

        match next {
            Some(interval) => {
                let interval = interval.max(self.platform.min_interval());
                trace!("timer: countdown set to {}", interval);
                self.platform.timer_set(interval);
            }
            None => {
                trace!("timer: countdown cancelled");
                self.platform.timer_cancel();
            }
        }
    }
}
