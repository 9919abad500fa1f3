//! Timer Control Block Zone
//!
//! Fixed-capacity store for timer control blocks, modeled on the Mach zone
//! allocator: blocks live in slots addressed by a stable [`SlotIndex`], and
//! the expiry queues refer to timers by slot rather than by reference.

use heapless::Vec as HVec;

use super::event::Notification;
use super::kobject::KobjectId;
use crate::error::{TimerError, TimerResult};
use crate::types::{ClockId, ITimerSpec};

/// Hard upper bound on live timers
pub const TIMER_ZONE_MAX: usize = 64;

/// Position of a control block in the zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SlotIndex(pub usize);

// ============================================================================
// Timer Control Block
// ============================================================================

/// Whether a timer is linked into its expiry queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Disarmed,
    Armed,
}

/// One kernel timer
#[derive(Debug, Clone)]
pub struct TimerControlBlock {
    /// Object table id this block was created under
    pub id: KobjectId,
    /// Clock domain the deadline is expressed in
    pub clock: ClockId,
    /// Absolute deadline and period
    pub itimer: ITimerSpec,
    pub state: ArmState,
    pub notification: Notification,
}

impl TimerControlBlock {
    pub fn new(id: KobjectId, clock: ClockId, notification: Notification) -> Self {
        Self {
            id,
            clock,
            itimer: ITimerSpec::disarmed(),
            state: ArmState::Disarmed,
            notification,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state == ArmState::Armed
    }

    pub fn is_periodic(&self) -> bool {
        self.itimer.interval.is_set()
    }
}

// ============================================================================
// Zone
// ============================================================================

/// Zone statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStats {
    /// Total allocations
    pub alloc_count: u64,
    /// Total frees
    pub free_count: u64,
    /// Current elements in use
    pub in_use: usize,
    /// High-water mark
    pub max_in_use: usize,
    /// Allocation failures
    pub failures: u64,
}

impl ZoneStats {
    fn record_alloc(&mut self) {
        self.alloc_count += 1;
        self.in_use += 1;
        if self.in_use > self.max_in_use {
            self.max_in_use = self.in_use;
        }
    }

    fn record_free(&mut self) {
        self.free_count += 1;
        self.in_use = self.in_use.saturating_sub(1);
    }

    fn record_failure(&mut self) {
        self.failures += 1;
    }
}

/// Arena of timer control blocks
#[derive(Debug)]
pub struct TimerZone {
    slots: HVec<Option<TimerControlBlock>, TIMER_ZONE_MAX>,
    capacity: usize,
    stats: ZoneStats,
}

impl TimerZone {
    /// Create a zone holding at most `capacity` blocks (clamped to
    /// `TIMER_ZONE_MAX`)
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HVec::new(),
            capacity: capacity.min(TIMER_ZONE_MAX),
            stats: ZoneStats::default(),
        }
    }

    /// Store a block, reusing the lowest free slot
    pub fn alloc(&mut self, block: TimerControlBlock) -> TimerResult<SlotIndex> {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(block);
            self.stats.record_alloc();
            return Ok(SlotIndex(index));
        }

        if self.is_full() || self.slots.push(Some(block)).is_err() {
            self.stats.record_failure();
            return Err(TimerError::OutOfMemory);
        }
        self.stats.record_alloc();
        Ok(SlotIndex(self.slots.len() - 1))
    }

    /// Release a slot, returning its block
    pub fn free(&mut self, slot: SlotIndex) -> Option<TimerControlBlock> {
        let block = self.slots.get_mut(slot.0)?.take()?;
        self.stats.record_free();
        Some(block)
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&TimerControlBlock> {
        self.slots.get(slot.0)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: SlotIndex) -> Option<&mut TimerControlBlock> {
        self.slots.get_mut(slot.0)?.as_mut()
    }

    pub fn is_full(&self) -> bool {
        self.in_use() >= self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.stats.in_use
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> ZoneStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: u64) -> TimerControlBlock {
        TimerControlBlock::new(KobjectId(id), ClockId::Monotonic, Notification::None)
    }

    #[test]
    fn test_alloc_free_reuse() {
        let mut zone = TimerZone::new(4);
        let a = zone.alloc(block(1)).unwrap();
        let b = zone.alloc(block(2)).unwrap();
        assert_ne!(a, b);
        assert_eq!(zone.get(b).unwrap().id, KobjectId(2));

        assert_eq!(zone.free(a).unwrap().id, KobjectId(1));
        assert!(zone.get(a).is_none());
        assert!(zone.free(a).is_none());

        let c = zone.alloc(block(3)).unwrap();
        assert_eq!(c, a);
        assert_eq!(zone.in_use(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut zone = TimerZone::new(2);
        zone.alloc(block(1)).unwrap();
        zone.alloc(block(2)).unwrap();
        assert!(zone.is_full());
        assert_eq!(zone.alloc(block(3)).unwrap_err(), TimerError::OutOfMemory);

        let stats = zone.stats();
        assert_eq!(stats.alloc_count, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.max_in_use, 2);
    }

    #[test]
    fn test_capacity_clamped() {
        let zone = TimerZone::new(TIMER_ZONE_MAX + 10);
        assert_eq!(zone.capacity(), TIMER_ZONE_MAX);
        assert!(zone.get(SlotIndex(TIMER_ZONE_MAX + 1)).is_none());
    }

    #[test]
    fn test_new_block_disarmed() {
        let b = block(9);
        assert!(!b.is_armed());
        assert!(!b.is_periodic());
        assert!(b.itimer.value.is_zero());
    }
}
