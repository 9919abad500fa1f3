//! System call layer for clocks and timers
//!
//! Entry points take raw user arguments: plain integers for clock ids and
//! flags, and `Option` references standing in for user pointers that may be
//! null. Every argument is checked, and every timer handle resolved, before
//! the kernel operation runs. Each call returns `0` or an errno value and
//! records the same value as the caller's last error.

use log::debug;

use crate::error::{TimerError, TimerResult};
use crate::kern::{SigEvent, SleepHandle, TimerHandle, TimerSubsystem};
use crate::libc::errno::errno_of;
use crate::types::{ClockId, ITimerSpec, TimeSpec, TimerFlags};

// ============================================================================
// Feature Commands
// ============================================================================

/// Query a kernel feature
pub const FEATURE_GET: i32 = 0;
/// Turn a kernel feature on or off
pub const FEATURE_SET: i32 = 1;

// ============================================================================
// Argument Validation
// ============================================================================

fn clock_arg(clockid: i32) -> TimerResult<ClockId> {
    ClockId::from_raw(clockid).ok_or(TimerError::InvalidArgument)
}

fn flags_arg(flags: i32) -> TimerResult<TimerFlags> {
    TimerFlags::from_raw(flags).ok_or(TimerError::InvalidArgument)
}

/// Non-null user pointer
fn ptr_arg<T>(arg: Option<T>) -> TimerResult<T> {
    arg.ok_or(TimerError::InvalidArgument)
}

/// Record the outcome as the caller's last error and return it
fn sys_exit(timers: &TimerSubsystem, result: TimerResult<()>) -> i32 {
    let errno = errno_of(&result);
    if let Err(e) = result {
        debug!("syscall: failed with {} ({})", e, errno);
    }
    timers.set_errno(errno);
    errno
}

// ============================================================================
// Clock Calls
// ============================================================================

/// Read clock `clockid` into `time`
pub fn sys_clock_gettime(timers: &TimerSubsystem, clockid: i32, time: Option<&mut TimeSpec>) -> i32 {
    let result = (|| -> TimerResult<()> {
        let clock = clock_arg(clockid)?;
        let time = ptr_arg(time)?;
        *time = timers.clock_gettime(clock);
        Ok(())
    })();
    sys_exit(timers, result)
}

/// Set clock `clockid` to `time`
pub fn sys_clock_settime(timers: &TimerSubsystem, clockid: i32, time: Option<&TimeSpec>) -> i32 {
    let result = (|| -> TimerResult<()> {
        let clock = clock_arg(clockid)?;
        let time = ptr_arg(time)?;
        timers.clock_settime(clock, *time)
    })();
    sys_exit(timers, result)
}

/// Sleep on `clockid` for (or, with `TIMER_ABSTIME`, until) `request`
///
/// `remain`, if given, receives zero on completion or the time left when
/// the sleep was interrupted.
pub fn sys_clock_nanosleep(
    timers: &TimerSubsystem,
    sleeper: &SleepHandle,
    clockid: i32,
    flags: i32,
    request: Option<&TimeSpec>,
    remain: Option<&mut TimeSpec>,
) -> i32 {
    let result = (|| -> TimerResult<()> {
        let clock = clock_arg(clockid)?;
        let flags = flags_arg(flags)?;
        let request = ptr_arg(request)?;

        let outcome = timers.clock_nanosleep(sleeper, clock, flags, *request);
        if let Some(remain) = remain {
            *remain = match outcome {
                Err(TimerError::Interrupted { remaining }) => remaining,
                _ => TimeSpec::ZERO,
            };
        }
        outcome
    })();
    sys_exit(timers, result)
}

// ============================================================================
// Timer Calls
// ============================================================================

/// Create a timer on `clockid`; its handle is written to `timerid`
pub fn sys_timer_create(
    timers: &TimerSubsystem,
    clockid: i32,
    evp: Option<&SigEvent>,
    timerid: Option<&mut TimerHandle>,
) -> i32 {
    let result = (|| -> TimerResult<()> {
        let clock = clock_arg(clockid)?;
        let evp = ptr_arg(evp)?;
        let timerid = ptr_arg(timerid)?;
        *timerid = timers.timer_create(clock, evp)?;
        Ok(())
    })();
    sys_exit(timers, result)
}

/// Delete timer `timerid`
pub fn sys_timer_delete(timers: &TimerSubsystem, timerid: Option<&TimerHandle>) -> i32 {
    let result = (|| -> TimerResult<()> {
        let timerid = ptr_arg(timerid)?;
        timers.timer_delete(*timerid)
    })();
    sys_exit(timers, result)
}

/// Arm or disarm timer `timerid`; the previous setting goes to `ovalue`
pub fn sys_timer_settime(
    timers: &TimerSubsystem,
    timerid: Option<&TimerHandle>,
    flags: i32,
    value: Option<&ITimerSpec>,
    ovalue: Option<&mut ITimerSpec>,
) -> i32 {
    let result = (|| -> TimerResult<()> {
        let timerid = ptr_arg(timerid)?;
        let flags = flags_arg(flags)?;
        let value = ptr_arg(value)?;
        let previous = timers.timer_settime(*timerid, flags, value)?;
        if let Some(ovalue) = ovalue {
            *ovalue = previous;
        }
        Ok(())
    })();
    sys_exit(timers, result)
}

/// Read the remaining time and period of timer `timerid`
pub fn sys_timer_gettime(
    timers: &TimerSubsystem,
    timerid: Option<&TimerHandle>,
    value: Option<&mut ITimerSpec>,
) -> i32 {
    let result = (|| -> TimerResult<()> {
        let timerid = ptr_arg(timerid)?;
        let value = ptr_arg(value)?;
        *value = timers.timer_gettime(*timerid)?;
        Ok(())
    })();
    sys_exit(timers, result)
}

/// Query or switch the timers feature; the state before the call goes to
/// `previous`
pub fn sys_feature_timers(
    timers: &TimerSubsystem,
    cmd: i32,
    enable: bool,
    previous: Option<&mut bool>,
) -> i32 {
    let result = (|| -> TimerResult<()> {
        let was_enabled = timers.feature_enabled();
        match cmd {
            FEATURE_GET => {}
            FEATURE_SET => timers.set_feature_enabled(enable),
            _ => return Err(TimerError::InvalidArgument),
        }
        if let Some(previous) = previous {
            *previous = was_enabled;
        }
        Ok(())
    })();
    sys_exit(timers, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimPlatform;
    use crate::config::TimerConfig;
    use crate::libc::errno::{EINVAL, ENOENT, ENOTSUP, ESUCCESS};
    use alloc::sync::Arc;

    fn setup() -> (Arc<SimPlatform>, TimerSubsystem) {
        let sim = Arc::new(SimPlatform::new());
        let timers = TimerSubsystem::new(sim.clone(), TimerConfig::default());
        (sim, timers)
    }

    #[test]
    fn test_null_and_bad_arguments() {
        let (_sim, timers) = setup();
        let mut handle = TimerHandle::default();

        assert_eq!(sys_clock_gettime(&timers, 0, None), EINVAL);
        assert_eq!(timers.errno(), EINVAL);
        assert_eq!(sys_clock_gettime(&timers, 5, Some(&mut TimeSpec::ZERO)), EINVAL);
        assert_eq!(sys_timer_create(&timers, 0, None, Some(&mut handle)), EINVAL);
        assert_eq!(sys_timer_create(&timers, 0, Some(&SigEvent::none()), None), EINVAL);
        assert_eq!(sys_timer_delete(&timers, None), EINVAL);
        assert_eq!(sys_timer_gettime(&timers, Some(&handle), None), EINVAL);
        assert_eq!(timers.object_count(), 0);
    }

    #[test]
    fn test_timer_lifecycle() {
        let (_sim, timers) = setup();
        let mut handle = TimerHandle::default();
        assert_eq!(
            sys_timer_create(&timers, 1, Some(&SigEvent::none()), Some(&mut handle)),
            ESUCCESS
        );
        assert_eq!(timers.errno(), ESUCCESS);

        let setting = ITimerSpec::periodic(TimeSpec::from_secs(2), TimeSpec::from_secs(1));
        let mut old = ITimerSpec::periodic(TimeSpec::MAX, TimeSpec::MAX);
        assert_eq!(
            sys_timer_settime(&timers, Some(&handle), 0, Some(&setting), Some(&mut old)),
            ESUCCESS
        );
        assert_eq!(old, ITimerSpec::disarmed());

        let mut current = ITimerSpec::default();
        assert_eq!(sys_timer_gettime(&timers, Some(&handle), Some(&mut current)), ESUCCESS);
        assert_eq!(current, setting);

        assert_eq!(
            sys_timer_settime(&timers, Some(&handle), 8, Some(&setting), None),
            EINVAL
        );

        assert_eq!(sys_timer_delete(&timers, Some(&handle)), ESUCCESS);
        assert_eq!(sys_timer_delete(&timers, Some(&handle)), ENOENT);
        assert_eq!(sys_timer_gettime(&timers, Some(&handle), Some(&mut current)), ENOENT);
        assert_eq!(timers.errno(), ENOENT);
    }

    #[test]
    fn test_unsupported_notification() {
        let (_sim, timers) = setup();
        let mut handle = TimerHandle::default();
        assert_eq!(
            sys_timer_create(&timers, 0, Some(&SigEvent::signal(14)), Some(&mut handle)),
            ENOTSUP
        );
        assert_eq!(handle, TimerHandle::default());
        assert_eq!(timers.object_count(), 0);
    }

    #[test]
    fn test_clock_calls() {
        let (sim, timers) = setup();
        sim.advance(TimeSpec::from_secs(3));
        let mut now = TimeSpec::ZERO;
        assert_eq!(sys_clock_gettime(&timers, 1, Some(&mut now)), ESUCCESS);
        assert_eq!(now, TimeSpec::from_secs(3));

        let wall = TimeSpec::from_secs(1_000);
        assert_eq!(sys_clock_settime(&timers, 0, Some(&wall)), ESUCCESS);
        assert_eq!(sys_clock_settime(&timers, 1, Some(&wall)), EINVAL);
        assert_eq!(sys_clock_settime(&timers, 0, None), EINVAL);
        assert_eq!(sys_clock_gettime(&timers, 0, Some(&mut now)), ESUCCESS);
        assert_eq!(now, wall);
    }

    #[test]
    fn test_nanosleep_writes_remaining() {
        let (sim, timers) = setup();
        let sleeper = SleepHandle::new();
        let mut remain = TimeSpec::MAX;
        let request = TimeSpec::from_millis(1_500);
        assert_eq!(
            sys_clock_nanosleep(&timers, &sleeper, 1, 0, Some(&request), Some(&mut remain)),
            ESUCCESS
        );
        assert_eq!(remain, TimeSpec::ZERO);
        assert_eq!(sim.now(), request);

        assert_eq!(
            sys_clock_nanosleep(&timers, &sleeper, 1, 0, None, Some(&mut remain)),
            EINVAL
        );
        assert_eq!(
            sys_clock_nanosleep(&timers, &sleeper, 1, 2, Some(&request), None),
            EINVAL
        );
    }

    #[test]
    fn test_feature_switch() {
        let (sim, timers) = setup();
        let mut previous = false;
        assert_eq!(sys_feature_timers(&timers, FEATURE_GET, false, Some(&mut previous)), ESUCCESS);
        assert!(previous);

        assert_eq!(sys_feature_timers(&timers, FEATURE_SET, false, Some(&mut previous)), ESUCCESS);
        assert!(previous);
        assert!(!timers.feature_enabled());
        assert_eq!(sim.countdown(), None);

        assert_eq!(sys_feature_timers(&timers, 7, true, None), EINVAL);
        assert!(!timers.feature_enabled());
    }
}
