//! Time provider abstraction for sample timestamps
//!
//! Poll strategies never read the clock directly; they ask a [`TimeProvider`],
//! so tests can pin or step time deterministically.

use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

/// Timestamp format used by the CSV sink (millisecond precision)
pub const SINK_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Time provider trait for generating sample timestamps
pub trait TimeProvider: Send + Sync + 'static {
    /// Current local wall-clock time
    fn now(&self) -> DateTime<Local>;
}

/// System time provider using the local clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Fixed time provider for testing
///
/// Returns a predetermined timestamp, useful for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeProvider {
    timestamp: DateTime<Local>,
}

impl FixedTimeProvider {
    pub fn new(timestamp: DateTime<Local>) -> Self {
        Self { timestamp }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Local> {
        self.timestamp
    }
}

/// Time provider that advances by a fixed step on every call
#[derive(Debug)]
pub struct SteppingTimeProvider {
    next: Mutex<DateTime<Local>>,
    step: Duration,
}

impl SteppingTimeProvider {
    pub fn new(start: DateTime<Local>, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl TimeProvider for SteppingTimeProvider {
    fn now(&self) -> DateTime<Local> {
        let mut next = self.next.lock();
        let current = *next;
        let step = chrono::Duration::from_std(self.step).unwrap_or_else(|_| chrono::Duration::zero());
        *next = current + step;
        current
    }
}

/// Render a timestamp the way the CSV sink writes it
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(SINK_TIMESTAMP_FORMAT).to_string()
}
