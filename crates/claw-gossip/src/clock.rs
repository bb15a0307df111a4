//! Monotonic wall-clock timestamps.
//!
//! Info conflicts are resolved by origination timestamp with ties going to
//! the incumbent, so two infos created back to back must never share a
//! timestamp. [`MonotonicClock`] samples the wall clock and bumps the result
//! past the last value it handed out whenever the clock has not advanced.

use chrono::Utc;
use parking_lot::{const_mutex, Mutex};

/// Process-wide clock used for info timestamps.
static GLOBAL_CLOCK: MonotonicClock = MonotonicClock::new();

/// A strictly increasing Unix-nanosecond clock.
#[derive(Debug)]
pub struct MonotonicClock {
    /// Last value returned by [`MonotonicClock::now_unix_nano`].
    last: Mutex<i64>,
}

impl MonotonicClock {
    /// Creates a clock that has not handed out any timestamps yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: const_mutex(0),
        }
    }

    /// Returns the current Unix time in nanoseconds, strictly greater than
    /// every value previously returned by this clock.
    pub fn now_unix_nano(&self) -> i64 {
        let mut last = self.last.lock();
        let mut now = wall_unix_nano();
        if now <= *last {
            now = last.saturating_add(1);
        }
        *last = now;
        now
    }

    /// Returns the current time without advancing the clock.
    ///
    /// The result is never behind a timestamp this clock already issued, so
    /// an expiry computed from an issued timestamp is observed as reached.
    pub fn peek_unix_nano(&self) -> i64 {
        let last = self.last.lock();
        wall_unix_nano().max(*last)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a strictly increasing Unix-nanosecond timestamp from the
/// process-wide clock.
pub fn monotonic_unix_nano() -> i64 {
    GLOBAL_CLOCK.now_unix_nano()
}

/// Returns "now" for expiry checks against process-wide timestamps.
pub(crate) fn current_unix_nano() -> i64 {
    GLOBAL_CLOCK.peek_unix_nano()
}

fn wall_unix_nano() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
