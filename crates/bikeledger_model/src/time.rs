//! Timestamps: parsing, formatting and a collision-free generator.
//!
//! Log entries use their exact creation timestamp as identity, so two
//! entries written in the same millisecond on one device must still get
//! distinct timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time in Unix milliseconds.
pub trait TimeSource: Send + Sync {
    /// Current time.
    fn now_millis(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `millis`.
    #[must_use]
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Jumps to `millis`.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Moves forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

/// Hands out strictly increasing ISO-8601 timestamps.
///
/// When the clock has not moved past the last value handed out, the next
/// value is the last one plus 1 ms.
#[derive(Debug)]
pub struct UniqueTimestamps<C = SystemClock> {
    clock: C,
    last: Mutex<i64>,
}

impl Default for UniqueTimestamps<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: TimeSource> UniqueTimestamps<C> {
    /// Creates a generator over `clock`.
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(i64::MIN),
        }
    }

    /// Makes sure later values sort after `timestamp`, typically the newest
    /// entry already in the log.
    pub fn observe(&self, timestamp: &str) {
        if let Some(millis) = parse_millis(timestamp) {
            let mut last = self.last.lock();
            *last = (*last).max(millis);
        }
    }

    /// Next timestamp in Unix milliseconds.
    pub fn next_millis(&self) -> i64 {
        let now = self.clock.now_millis();
        let mut last = self.last.lock();
        let next = if now > *last { now } else { *last + 1 };
        *last = next;
        next
    }

    /// Next timestamp, formatted.
    pub fn next(&self) -> String {
        format_millis(self.next_millis())
    }
}

/// Formats Unix milliseconds as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Parses an ISO-8601 timestamp or a bare date into Unix milliseconds.
///
/// Accepts RFC 3339 with any offset, a naive date-time (read as UTC) and a
/// plain `YYYY-MM-DD` date (midnight UTC). Anything else is `None`.
#[must_use]
pub fn parse_millis(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Current time, formatted.
#[must_use]
pub fn now_iso() -> String {
    format_millis(SystemClock.now_millis())
}
