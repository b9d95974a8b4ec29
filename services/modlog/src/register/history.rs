//! Fixed-capacity sample history
//!
//! A ring buffer of `(timestamp, value)` pairs. Once full, every insert
//! overwrites the oldest entry, so the length never exceeds the capacity.

use chrono::{DateTime, Local};
use serde::Serialize;

/// Default number of samples kept per register
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// One decoded sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Local>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ring buffer of samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct History {
    /// Storage grows up to `capacity`, then wraps
    buf: Vec<Sample>,
    /// Index of the oldest sample once the buffer is full
    head: usize,
    capacity: usize,
}

impl History {
    /// Create an empty history; a zero capacity is raised to 1
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::new(),
            head: 0,
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: Sample) {
        if self.buf.len() < self.capacity {
            self.buf.push(sample);
        } else {
            self.buf[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        if self.buf.is_empty() {
            return None;
        }
        let idx = (self.head + self.buf.len() - 1) % self.buf.len();
        self.buf.get(idx)
    }

    /// Oldest sample
    pub fn oldest(&self) -> Option<&Sample> {
        self.buf.get(self.head)
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        let (newer, older) = self.buf.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Values only, oldest to newest
    pub fn values(&self) -> Vec<f64> {
        self.iter().map(|s| s.value).collect()
    }

    /// Copy out all samples, oldest to newest
    pub fn to_vec(&self) -> Vec<Sample> {
        self.iter().copied().collect()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
