//! Interrupt routing
//!
//! Handler table for the interrupt sources the timer subsystem sees. The
//! countdown interrupt is bound to the scheduler when the subsystem is
//! created; other lines are free for drivers, e.g. to cancel a sleep.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use log::{trace, warn};

use super::TimerSubsystem;
use crate::arch::Irq;

/// Interrupt handler type
pub type IrqHandler = Arc<dyn Fn(&TimerSubsystem, Irq) + Send + Sync>;

/// Interrupt delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InterruptStats {
    /// Interrupts routed to a handler
    pub delivered: u64,
    /// Interrupts with no handler registered
    pub unhandled: u64,
}

/// Interrupt handler table
#[derive(Default)]
pub struct InterruptTable {
    handlers: BTreeMap<Irq, IrqHandler>,
    stats: InterruptStats,
}

impl InterruptTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&mut self, irq: Irq) -> Option<IrqHandler> {
        match self.handlers.get(&irq) {
            Some(handler) => {
                self.stats.delivered += 1;
                Some(Arc::clone(handler))
            }
            None => {
                self.stats.unhandled += 1;
                None
            }
        }
    }
}

impl TimerSubsystem {
    /// Register a handler for `irq`, replacing any previous one
    pub fn register_irq_handler<F>(&self, irq: Irq, handler: F)
    where
        F: Fn(&TimerSubsystem, Irq) + Send + Sync + 'static,
    {
        self.interrupts.lock().handlers.insert(irq, Arc::new(handler));
    }

    /// Remove the handler for `irq`; returns false if none was registered
    pub fn unregister_irq_handler(&self, irq: Irq) -> bool {
        self.interrupts.lock().handlers.remove(&irq).is_some()
    }

    /// Route an interrupt to its handler
    ///
    /// The table lock is dropped before the handler runs, so handlers may
    /// register or remove handlers themselves.
    pub fn handle_interrupt(&self, irq: Irq) {
        let handler = self.interrupts.lock().lookup(irq);
        match handler {
            Some(handler) => {
                trace!("interrupt: {:?}", irq);
                handler(self, irq);
            }
            None => warn!("interrupt: no handler for {:?}", irq),
        }
    }

    /// Suspend until the next interrupt and service it
    ///
    /// Interrupts are enabled only while suspended; the handler runs with
    /// them disabled, as it would in interrupt context.
    pub fn wait_for_interrupt(&self) {
        let were_enabled = self.platform.interrupts_enabled();
        self.platform.enable_interrupts();
        let irq = self.platform.suspend();
        self.platform.disable_interrupts();

        self.handle_interrupt(irq);

        if were_enabled {
            self.platform.enable_interrupts();
        }
    }

    pub fn interrupt_stats(&self) -> InterruptStats {
        self.interrupts.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimPlatform;
    use crate::arch::Platform;
    use crate::config::TimerConfig;
    use crate::types::TimeSpec;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_external_irq_routed() {
        let sim = Arc::new(SimPlatform::new());
        let timers = TimerSubsystem::new(sim.clone(), TimerConfig::default());
        let hits = Arc::new(AtomicU32::new(0));
        let hits_in = Arc::clone(&hits);
        timers.register_irq_handler(Irq::External(3), move |_, irq| {
            assert_eq!(irq, Irq::External(3));
            hits_in.fetch_add(1, Ordering::SeqCst);
        });

        sim.raise_at(TimeSpec::from_secs(1), Irq::External(3));
        timers.wait_for_interrupt();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sim.now(), TimeSpec::from_secs(1));
        assert_eq!(timers.interrupt_stats().delivered, 1);
    }

    #[test]
    fn test_unhandled_irq_counted() {
        let sim = Arc::new(SimPlatform::new());
        let timers = TimerSubsystem::new(sim.clone(), TimerConfig::default());
        assert!(!timers.unregister_irq_handler(Irq::External(9)));
        timers.handle_interrupt(Irq::External(9));
        assert_eq!(timers.interrupt_stats().unhandled, 1);
    }

    #[test]
    fn test_wait_restores_interrupt_state() {
        let sim = Arc::new(SimPlatform::new());
        let timers = TimerSubsystem::new(sim.clone(), TimerConfig::default());
        sim.raise_at(TimeSpec::from_secs(1), Irq::External(0));
        timers.register_irq_handler(Irq::External(0), |_, _| {});

        assert!(!sim.interrupts_enabled());
        timers.wait_for_interrupt();
        assert!(!sim.interrupts_enabled());
    }
}
