//! Common types used across the timer subsystem
//!
//! Time values, clock identifiers and the POSIX `itimerspec`/`sigval`
//! equivalents shared by the kernel and the syscall layer.

use core::fmt;

/// Nanoseconds per second
pub const NSEC_PER_SEC: u32 = 1_000_000_000;

// ============================================================================
// Clock Identifiers
// ============================================================================

/// Clock domain a timer (or a clock read) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ClockId {
    /// Wall clock, adjustable through `clock_settime`
    Realtime = 0,
    /// Strictly increasing, never adjusted
    Monotonic = 1,
}

impl ClockId {
    /// Every supported clock domain, in queue order
    pub const ALL: [ClockId; 2] = [ClockId::Realtime, ClockId::Monotonic];

    /// Convert from a raw user-supplied clock id
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Realtime),
            1 => Some(Self::Monotonic),
            _ => None,
        }
    }

    /// Index of this domain's expiry queue
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Can this clock be set?
    pub fn is_adjustable(self) -> bool {
        matches!(self, Self::Realtime)
    }

    /// Get clock name for debugging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Monotonic => "monotonic",
        }
    }
}

// ============================================================================
// Time Values
// ============================================================================

/// Time value (seconds + nanoseconds), used both as an absolute instant of
/// some clock domain and as a relative duration.
///
/// A well-formed value keeps `nanoseconds < NSEC_PER_SEC`; user-supplied
/// values are checked with [`TimeSpec::is_valid`] before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSpec {
    /// Seconds
    pub seconds: u64,
    /// Nanoseconds (0-999999999)
    pub nanoseconds: u32,
}

impl TimeSpec {
    pub const ZERO: Self = Self::new(0, 0);

    /// Largest representable time value
    pub const MAX: Self = Self::new(u64::MAX, NSEC_PER_SEC - 1);

    /// Create new time value
    pub const fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    pub const fn from_secs(seconds: u64) -> Self {
        Self::new(seconds, 0)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::new(millis / 1000, ((millis % 1000) * 1_000_000) as u32)
    }

    /// Create from total nanoseconds, saturating at [`TimeSpec::MAX`]
    pub fn from_nanos(nanos: u128) -> Self {
        let seconds = nanos / NSEC_PER_SEC as u128;
        if seconds > u64::MAX as u128 {
            return Self::MAX;
        }
        Self::new(seconds as u64, (nanos % NSEC_PER_SEC as u128) as u32)
    }

    /// Convert to total nanoseconds
    pub fn as_nanos(&self) -> u128 {
        self.seconds as u128 * NSEC_PER_SEC as u128 + self.nanoseconds as u128
    }

    /// Is the nanosecond field in range?
    pub fn is_valid(&self) -> bool {
        self.nanoseconds < NSEC_PER_SEC
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }

    /// Non-zero time value (POSIX "armed" value)
    pub fn is_set(&self) -> bool {
        !self.is_zero()
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self::from_nanos(self.as_nanos().saturating_add(other.as_nanos()))
    }

    /// Difference clamped at zero
    pub fn saturating_sub(self, other: Self) -> Self {
        Self::from_nanos(self.as_nanos().saturating_sub(other.as_nanos()))
    }

    /// Half of this value, rounding down
    pub fn half(self) -> Self {
        Self::from_nanos(self.as_nanos() / 2)
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.seconds, self.nanoseconds)
    }
}

/// Timer setting: first expiration plus repeat interval
///
/// Inside the kernel `value` is an absolute deadline; across the API
/// boundary it is relative to now unless `TimerFlags::ABSTIME` is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ITimerSpec {
    /// Expiration (zero means disarmed)
    pub value: TimeSpec,
    /// Period (zero means one-shot)
    pub interval: TimeSpec,
}

impl ITimerSpec {
    pub const fn new(value: TimeSpec, interval: TimeSpec) -> Self {
        Self { value, interval }
    }

    pub const fn one_shot(value: TimeSpec) -> Self {
        Self::new(value, TimeSpec::ZERO)
    }

    pub const fn periodic(first: TimeSpec, period: TimeSpec) -> Self {
        Self::new(first, period)
    }

    pub const fn disarmed() -> Self {
        Self::new(TimeSpec::ZERO, TimeSpec::ZERO)
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_valid() && self.interval.is_valid()
    }
}

// ============================================================================
// Timer Flags
// ============================================================================

/// Flags for `timer_settime` and `clock_nanosleep`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerFlags(pub u32);

impl TimerFlags {
    /// Relative time (default)
    pub const RELATIVE: Self = Self(0);
    /// `value` is an absolute time of the timer's clock
    pub const ABSTIME: Self = Self(0x00000001);

    const ALL: u32 = Self::ABSTIME.0;

    /// Convert from raw user flags, rejecting unknown bits
    pub fn from_raw(raw: i32) -> Option<Self> {
        let raw = raw as u32;
        if raw & !Self::ALL != 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

// ============================================================================
// Signal Value
// ============================================================================

/// Value carried by a notification to its action (POSIX `sigval`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SigVal(pub usize);

impl SigVal {
    pub const fn from_int(value: i32) -> Self {
        Self(value as u32 as usize)
    }

    pub const fn as_int(&self) -> i32 {
        self.0 as u32 as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_spec_arith() {
        let a = TimeSpec::new(1, 700_000_000);
        let b = TimeSpec::new(0, 500_000_000);
        assert_eq!(a.saturating_add(b), TimeSpec::new(2, 200_000_000));
        assert_eq!(a.saturating_sub(b), TimeSpec::new(1, 200_000_000));
        assert_eq!(b.saturating_sub(a), TimeSpec::ZERO);
        assert_eq!(TimeSpec::MAX.saturating_add(a), TimeSpec::MAX);
    }

    #[test]
    fn test_time_spec_order_and_half() {
        assert!(TimeSpec::new(1, 0) > TimeSpec::new(0, 999_999_999));
        assert_eq!(TimeSpec::new(3, 0).half(), TimeSpec::new(1, 500_000_000));
        assert_eq!(TimeSpec::from_millis(2_500), TimeSpec::new(2, 500_000_000));
        assert!(!TimeSpec::new(0, NSEC_PER_SEC).is_valid());
    }

    #[test]
    fn test_clock_id() {
        assert_eq!(ClockId::from_raw(0), Some(ClockId::Realtime));
        assert_eq!(ClockId::from_raw(1), Some(ClockId::Monotonic));
        assert_eq!(ClockId::from_raw(7), None);
        assert!(ClockId::Realtime.is_adjustable());
        assert!(!ClockId::Monotonic.is_adjustable());
    }

    #[test]
    fn test_timer_flags() {
        assert_eq!(TimerFlags::from_raw(0), Some(TimerFlags::RELATIVE));
        let abs = TimerFlags::from_raw(1).unwrap();
        assert!(abs.contains(TimerFlags::ABSTIME));
        assert_eq!(TimerFlags::from_raw(4), None);
    }

    #[test]
    fn test_sig_val() {
        assert_eq!(SigVal::from_int(-3).as_int(), -3);
    }
}
