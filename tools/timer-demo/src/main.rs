//! Timer API walkthrough
//!
//! Boots the timer subsystem on the simulated platform and runs three
//! periodic alarms while the main flow sleeps:
//!
//! - every 1s (realtime): print both clocks relative to start
//! - every 2s (realtime): nudge the realtime clock 1s toward monotonic
//! - every 5s (monotonic): nudge the realtime clock 10s toward monotonic

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};

use ktimers::arch::sim::SimPlatform;
use ktimers::libc::errno::{EINTR, ESUCCESS};
use ktimers::syscall::*;
use ktimers::*;

#[derive(Parser)]
#[command(name = "timer-demo")]
#[command(about = "Periodic alarms and sleep on a simulated timer", long_about = None)]
struct Cli {
    /// How long the main flow sleeps, in seconds
    #[arg(short, long, default_value_t = 12)]
    seconds: u64,

    /// Start with the realtime clock this many seconds ahead (negative:
    /// behind) of where it should be
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    skew: i64,

    /// Raise an external interrupt that cancels the sleep at this
    /// monotonic second
    #[arg(long)]
    interrupt_at: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Clock values at program start
#[derive(Clone, Copy)]
struct Origin {
    realtime: TimeSpec,
    monotonic: TimeSpec,
}

impl Origin {
    /// Signed nanoseconds elapsed on `clock` since start
    fn elapsed(&self, timers: &TimerSubsystem, clock: ClockId) -> i128 {
        let start = match clock {
            ClockId::Realtime => self.realtime,
            ClockId::Monotonic => self.monotonic,
        };
        timers.clock_gettime(clock).as_nanos() as i128 - start.as_nanos() as i128
    }
}

const NANOS: i128 = 1_000_000_000;

/// Seconds and tenths, e.g. `3:4`
fn show(nanos: i128) -> String {
    let sign = if nanos < 0 { "-" } else { "" };
    let nanos = nanos.abs();
    format!("{}{}:{}", sign, nanos / NANOS, nanos % NANOS / 100_000_000)
}

fn print_clocks(timers: &TimerSubsystem, origin: Origin) {
    println!(
        "CLOCK_MONOTONIC: {}",
        show(origin.elapsed(timers, ClockId::Monotonic))
    );
    println!(
        "CLOCK_REALTIME: {}",
        show(origin.elapsed(timers, ClockId::Realtime))
    );
}

/// Move the realtime clock `step` seconds toward monotonic time
fn nudge_realtime(timers: &TimerSubsystem, origin: Origin, step: u64) {
    let real = origin.elapsed(timers, ClockId::Realtime) / NANOS;
    let mono = origin.elapsed(timers, ClockId::Monotonic) / NANOS;
    let now = timers.clock_gettime(ClockId::Realtime);
    let step = TimeSpec::from_secs(step);

    let adjusted = if real > mono {
        now.saturating_sub(step)
    } else if real < mono {
        now.saturating_add(step)
    } else {
        return;
    };

    let clockid = ClockId::Realtime as i32;
    let errno = sys_clock_settime(timers, clockid, Some(&adjusted));
    if errno != ESUCCESS {
        warn!("clock_settime failed with errno {}", errno);
    }
}

fn check(errno: i32, call: &str) -> anyhow::Result<()> {
    if errno != ESUCCESS {
        bail!("{} failed with errno {}", call, errno);
    }
    Ok(())
}

fn start_alarm(
    timers: &TimerSubsystem,
    clock: ClockId,
    period: u64,
    event: SigEvent,
) -> anyhow::Result<TimerHandle> {
    let mut handle = TimerHandle::default();
    check(
        sys_timer_create(timers, clock as i32, Some(&event), Some(&mut handle)),
        "timer_create",
    )?;

    let period = TimeSpec::from_secs(period);
    let setting = ITimerSpec::periodic(period, period);
    check(
        sys_timer_settime(timers, Some(&handle), 0, Some(&setting), None),
        "timer_settime",
    )?;
    Ok(handle)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let sim = Arc::new(SimPlatform::new());
    let timers = TimerSubsystem::new(sim.clone(), TimerConfig::default());

    let origin = Origin {
        realtime: timers.clock_gettime(ClockId::Realtime),
        monotonic: timers.clock_gettime(ClockId::Monotonic),
    };
    if cli.skew != 0 {
        let skew = TimeSpec::from_secs(cli.skew.unsigned_abs());
        let skewed = if cli.skew > 0 {
            origin.realtime.saturating_add(skew)
        } else {
            origin.realtime.saturating_sub(skew)
        };
        timers
            .clock_settime(ClockId::Realtime, skewed)
            .context("skewing realtime clock")?;
    }
    println!("System real time: {}", timers.clock_gettime(ClockId::Realtime));
    println!("System monotonic time: {}", origin.monotonic);

    let alarms = [
        start_alarm(
            &timers,
            ClockId::Realtime,
            1,
            SigEvent::thread(SigVal(1), move |timers, _| print_clocks(timers, origin)),
        )?,
        start_alarm(
            &timers,
            ClockId::Realtime,
            2,
            SigEvent::thread(SigVal(2), move |timers, _| nudge_realtime(timers, origin, 1)),
        )?,
        start_alarm(
            &timers,
            ClockId::Monotonic,
            5,
            SigEvent::thread(SigVal(5), move |timers, _| nudge_realtime(timers, origin, 10)),
        )?,
    ];

    let sleeper = SleepHandle::new();
    if let Some(at) = cli.interrupt_at {
        let cancel = sleeper.clone();
        timers.register_irq_handler(Irq::External(1), move |timers, _| {
            if let Err(e) = timers.interrupt_sleep(&cancel) {
                warn!("nothing to interrupt: {}", e);
            }
        });
        sim.raise_at(TimeSpec::from_secs(at), Irq::External(1));
    }

    let mut request = TimeSpec::from_secs(cli.seconds);
    while request.is_set() {
        let mut remain = TimeSpec::ZERO;
        let errno = sys_clock_nanosleep(
            &timers,
            &sleeper,
            ClockId::Realtime as i32,
            0,
            Some(&request),
            Some(&mut remain),
        );
        match errno {
            ESUCCESS => {}
            EINTR => println!("Interrupted sleep? {} left", remain),
            _ => bail!("clock_nanosleep failed with errno {}", errno),
        }
        request = remain;
    }

    for alarm in &alarms {
        check(sys_timer_delete(&timers, Some(alarm)), "timer_delete")?;
    }
    info!(
        "done after {} monotonic, {} timers created",
        show(origin.elapsed(&timers, ClockId::Monotonic)),
        timers.zone_stats().alloc_count
    );
    Ok(())
}
