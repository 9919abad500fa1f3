//! Kern subsystem - the kernel timer service
//!
//! [`TimerSubsystem`] is the process-wide timer context: the control block
//! zone, the kernel object table, one expiry queue per clock domain and the
//! interrupt handler table, all driving a single hardware countdown.
//!
//! Queue and zone state sits behind one lock that is only ever taken with
//! interrupts disabled. Notifications run after the lock is released, so an
//! action may call back into the timer API.

pub mod clock;
pub mod event;
pub mod interrupt;
pub mod kobject;
pub mod timer;
pub mod timer_zone;

pub use clock::SleepHandle;
pub use event::{
    Notification, SigEvent, TimerAction, SIGEV_NONE, SIGEV_SIGNAL, SIGEV_THREAD, SIGEV_THREAD_ID,
};
pub use interrupt::{InterruptStats, IrqHandler};
pub use kobject::{KobjectId, KobjectTable, KobjectType};
pub use timer::{Expiry, ExpiryQueue};
pub use timer_zone::{ArmState, SlotIndex, TimerControlBlock, TimerZone, ZoneStats, TIMER_ZONE_MAX};

use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicI32, Ordering};

use log::{info, warn};
use spin::{Mutex, MutexGuard, Once};

use self::interrupt::InterruptTable;
use crate::arch::{Irq, IrqGuard, Platform};
use crate::config::TimerConfig;
use crate::error::{TimerError, TimerResult};
use crate::libc::errno::ESUCCESS;
use crate::types::{ClockId, TimeSpec};

// ============================================================================
// Timer Handles
// ============================================================================

/// User-visible timer handle
///
/// Only meaningful while the object table considers `id` live; every
/// operation re-validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimerHandle {
    pub id: KobjectId,
    pub slot: SlotIndex,
}

// ============================================================================
// Timer State
// ============================================================================

/// Everything mutated under the timer lock
pub(crate) struct TimerState {
    pub zone: TimerZone,
    pub objects: KobjectTable,
    /// Indexed by `ClockId::index()`
    pub queues: [ExpiryQueue; 2],
    /// Timers feature switch
    pub enabled: bool,
}

impl TimerState {
    fn new(config: &TimerConfig) -> Self {
        Self {
            zone: TimerZone::new(config.zone_capacity()),
            objects: KobjectTable::new(),
            queues: [ExpiryQueue::new(), ExpiryQueue::new()],
            enabled: config.timers_enabled,
        }
    }

    /// Validate a user handle against the object table and the zone
    pub fn resolve(&self, handle: TimerHandle) -> TimerResult<SlotIndex> {
        if !self.objects.is_live(handle.id) {
            warn!("timer: stale handle {:?}", handle.id);
            return Err(TimerError::NotFound);
        }
        match self.zone.get(handle.slot) {
            Some(block) if block.id == handle.id => Ok(handle.slot),
            _ => {
                warn!("timer: handle {:?} does not match slot {:?}", handle.id, handle.slot);
                Err(TimerError::InvalidArgument)
            }
        }
    }

    /// Control block of a resolved or queued slot
    pub fn block(&self, slot: SlotIndex) -> &TimerControlBlock {
        match self.zone.get(slot) {
            Some(block) => block,
            None => panic!("timer: no control block in slot {:?}", slot),
        }
    }

    pub fn block_mut(&mut self, slot: SlotIndex) -> &mut TimerControlBlock {
        match self.zone.get_mut(slot) {
            Some(block) => block,
            None => panic!("timer: no control block in slot {:?}", slot),
        }
    }
}

/// Timer state lock held with interrupts disabled
///
/// The state guard is declared first so the lock is released before
/// interrupts are restored.
pub(crate) struct StateGuard<'a> {
    state: MutexGuard<'a, TimerState>,
    _irq: IrqGuard<'a>,
}

impl Deref for StateGuard<'_> {
    type Target = TimerState;

    fn deref(&self) -> &TimerState {
        &self.state
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut TimerState {
        &mut self.state
    }
}

// ============================================================================
// Timer Subsystem
// ============================================================================

/// Kernel timer subsystem
pub struct TimerSubsystem {
    platform: Arc<dyn Platform>,
    state: Mutex<TimerState>,
    interrupts: Mutex<InterruptTable>,
    /// Coalescing threshold for due deadlines
    slack: TimeSpec,
    /// Last error reported by a syscall
    errno: AtomicI32,
}

impl TimerSubsystem {
    /// Bring up the timer subsystem on `platform`
    ///
    /// Initializes the countdown hardware and binds its interrupt to the
    /// scheduler.
    pub fn new(platform: Arc<dyn Platform>, config: TimerConfig) -> Self {
        platform.timer_init();
        let slack = config.slack_for(platform.min_interval());

        let timers = Self {
            platform,
            state: Mutex::new(TimerState::new(&config)),
            interrupts: Mutex::new(InterruptTable::new()),
            slack,
            errno: AtomicI32::new(ESUCCESS),
        };
        timers.register_irq_handler(Irq::Timer, |timers: &TimerSubsystem, _irq: Irq| timers.tick());

        info!(
            "timer: initialized, {} control blocks, slack {}, timers {}",
            config.zone_capacity(),
            slack,
            if config.timers_enabled { "enabled" } else { "disabled" }
        );
        timers
    }

    /// Take the state lock with interrupts disabled
    pub(crate) fn lock_state(&self) -> StateGuard<'_> {
        let irq = IrqGuard::new(&*self.platform);
        StateGuard {
            state: self.state.lock(),
            _irq: irq,
        }
    }

    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    /// Coalescing threshold in effect
    pub fn slack(&self) -> TimeSpec {
        self.slack
    }

    /// Last error recorded by a syscall
    pub fn errno(&self) -> i32 {
        self.errno.load(Ordering::Relaxed)
    }

    pub(crate) fn set_errno(&self, errno: i32) {
        self.errno.store(errno, Ordering::Relaxed);
    }

    /// Turn the timers feature on or off
    ///
    /// While off the countdown stays cancelled and nothing fires; armed
    /// timers keep their deadlines and are rescheduled when turned back on.
    pub fn set_feature_enabled(&self, enabled: bool) {
        let mut state = self.lock_state();
        state.enabled = enabled;
        self.reprogram(&state);
        info!("timer: feature {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn feature_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    /// Number of live timer objects (user timers and sleep timers)
    pub fn object_count(&self) -> usize {
        self.lock_state().objects.count()
    }

    /// Live objects of one type
    pub fn object_count_by_type(&self, kotype: KobjectType) -> u32 {
        self.lock_state().objects.count_by_type(kotype)
    }

    pub fn zone_stats(&self) -> ZoneStats {
        self.lock_state().zone.stats()
    }

    /// Snapshot of a clock domain's expiry queue, head first
    pub fn queued(&self, clock: ClockId) -> alloc::vec::Vec<Expiry> {
        self.lock_state().queues[clock.index()].iter().copied().collect()
    }
}

// ============================================================================
// Global Instance
// ============================================================================

static TIMERS: Once<TimerSubsystem> = Once::new();

/// Initialize the global timer subsystem (first call wins)
pub fn init(platform: Arc<dyn Platform>, config: TimerConfig) -> &'static TimerSubsystem {
    TIMERS.call_once(|| TimerSubsystem::new(platform, config))
}

/// Global timer subsystem, if initialized
pub fn timers() -> Option<&'static TimerSubsystem> {
    TIMERS.get()
}
