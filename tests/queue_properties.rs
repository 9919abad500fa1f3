//! Property-based tests for expiry ordering
//!
//! Arbitrary arm/disarm sequences must leave every expiry queue sorted by
//! deadline with ties in arming order, and the countdown programmed for the
//! head.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ktimers::arch::sim::SimPlatform;
use ktimers::kern::{Expiry, ExpiryQueue, SlotIndex};
use ktimers::*;
use proptest::prelude::*;

// ════════════════════════════════════════════════════════════
// Strategies
// ════════════════════════════════════════════════════════════

const TIMERS: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Op {
    /// Arm timer `timer` `deadline_ms` milliseconds out
    Arm { timer: usize, deadline_ms: u64 },
    Disarm { timer: usize },
}

/// Deadlines from a small range so ties are common
fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..TIMERS, 1u64..20).prop_map(|(timer, deadline_ms)| Op::Arm { timer, deadline_ms }),
        1 => (0..TIMERS).prop_map(|timer| Op::Disarm { timer }),
    ]
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op(), 1..64)
}

fn boot() -> (Arc<SimPlatform>, TimerSubsystem) {
    let sim = Arc::new(SimPlatform::new());
    let timers = TimerSubsystem::new(sim.clone(), TimerConfig::default());
    (sim, timers)
}

/// Entries with equal deadlines appear in arming order
fn ties_in_arm_order(entries: &[Expiry], armed_seq: &HashMap<SlotIndex, usize>) -> bool {
    entries
        .windows(2)
        .filter(|w| w[0].deadline == w[1].deadline)
        .all(|w| armed_seq[&w[0].slot] < armed_seq[&w[1].slot])
}

// ════════════════════════════════════════════════════════════
// Expiry Queue Properties
// ════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The queue stays sorted and FIFO among ties after every operation
    #[test]
    fn queue_sorted_after_every_op(ops in ops()) {
        let mut queue = ExpiryQueue::new();
        let mut armed_seq = HashMap::new();

        for (seq, op) in ops.into_iter().enumerate() {
            match op {
                Op::Arm { timer, deadline_ms } => {
                    let slot = SlotIndex(timer);
                    queue.remove(slot);
                    queue.insert(Expiry { deadline: TimeSpec::from_millis(deadline_ms), slot });
                    armed_seq.insert(slot, seq);
                }
                Op::Disarm { timer } => {
                    queue.remove(SlotIndex(timer));
                    armed_seq.remove(&SlotIndex(timer));
                }
            }

            let entries: Vec<Expiry> = queue.iter().copied().collect();
            prop_assert!(queue.is_sorted());
            prop_assert!(ties_in_arm_order(&entries, &armed_seq));
            prop_assert_eq!(entries.len(), armed_seq.len());
        }
    }

    /// Popping due entries yields them in deadline order
    #[test]
    fn pop_due_never_skips_earlier_deadline(deadlines in prop::collection::vec(1u64..50, 1..32), limit in 0u64..60) {
        let mut queue = ExpiryQueue::new();
        for (i, &ms) in deadlines.iter().enumerate() {
            queue.insert(Expiry { deadline: TimeSpec::from_millis(ms), slot: SlotIndex(i) });
        }

        let limit = TimeSpec::from_millis(limit);
        let mut last = TimeSpec::ZERO;
        while let Some(expiry) = queue.pop_due(limit) {
            prop_assert!(expiry.deadline <= limit);
            prop_assert!(expiry.deadline >= last);
            last = expiry.deadline;
        }
        if let Some(head) = queue.peek() {
            prop_assert!(head.deadline > limit);
        }
    }
}

// ════════════════════════════════════════════════════════════
// Subsystem Properties
// ════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Through the timer API the queue stays ordered and the countdown
    /// always targets the head deadline
    #[test]
    fn countdown_tracks_queue_head(ops in ops()) {
        let (sim, timers) = boot();
        let handles: Vec<TimerHandle> = (0..TIMERS)
            .map(|_| timers.timer_create(ClockId::Monotonic, &SigEvent::none()).unwrap())
            .collect();
        let mut armed_seq = HashMap::new();

        for (seq, op) in ops.into_iter().enumerate() {
            match op {
                Op::Arm { timer, deadline_ms } => {
                    let setting = ITimerSpec::one_shot(TimeSpec::from_millis(deadline_ms));
                    timers.timer_settime(handles[timer], TimerFlags::RELATIVE, &setting).unwrap();
                    armed_seq.insert(handles[timer].slot, seq);
                }
                Op::Disarm { timer } => {
                    timers.timer_disarm(handles[timer]).unwrap();
                    armed_seq.remove(&handles[timer].slot);
                }
            }

            let queued = timers.queued(ClockId::Monotonic);
            prop_assert!(queued.windows(2).all(|w| w[0].deadline <= w[1].deadline));
            prop_assert!(ties_in_arm_order(&queued, &armed_seq));
            prop_assert_eq!(queued.len(), armed_seq.len());
            prop_assert_eq!(sim.countdown(), queued.first().map(|e| e.deadline));
        }
    }

    /// Timers fire in deadline order, ties in arming order
    #[test]
    fn timers_fire_in_deadline_then_arm_order(deadlines in prop::collection::vec(1u64..20, 1..TIMERS)) {
        let (sim, timers) = boot();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for (i, &ms) in deadlines.iter().enumerate() {
            let fired_in = Arc::clone(&fired);
            let event = SigEvent::thread(SigVal(i), move |_, value| {
                fired_in.lock().unwrap().push(value.0);
            });
            let handle = timers.timer_create(ClockId::Monotonic, &event).unwrap();
            let setting = ITimerSpec::one_shot(TimeSpec::from_millis(ms));
            timers.timer_settime(handle, TimerFlags::RELATIVE, &setting).unwrap();
        }

        sim.run_for(&timers, TimeSpec::from_millis(50));

        let mut expected: Vec<usize> = (0..deadlines.len()).collect();
        expected.sort_by_key(|&i| deadlines[i]);
        prop_assert_eq!(&*fired.lock().unwrap(), &expected);
    }
}
