//! Mutex-guarded history shared between the background poller and readers
//!
//! Flat `name -> samples` map with one global `max_points` cap. Every
//! operation takes the lock once, so readers never see a half-applied update.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::error::{ModlogError, Result};
use crate::register::Sample;

/// Default per-register cap
pub const DEFAULT_MAX_POINTS: usize = 1000;

#[derive(Debug)]
struct Inner {
    data: HashMap<String, VecDeque<Sample>>,
    running: bool,
    max_points: usize,
}

impl Inner {
    fn truncate(list: &mut VecDeque<Sample>, max_points: usize) {
        while list.len() > max_points {
            list.pop_front();
        }
    }
}

/// Thread-safe sample store
#[derive(Debug)]
pub struct ConcurrentStateStore {
    inner: Mutex<Inner>,
}

impl Default for ConcurrentStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl ConcurrentStateStore {
    /// Create a store; a zero cap is raised to 1
    pub fn new(max_points: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: HashMap::new(),
                running: false,
                max_points: max_points.max(1),
            }),
        }
    }

    /// Append a value stamped with the current local time
    pub fn update(&self, name: &str, value: f64) {
        self.update_at(name, Local::now(), value);
    }

    /// Append a value, keeping only the most recent `max_points`
    pub fn update_at(&self, name: &str, timestamp: DateTime<Local>, value: f64) {
        let mut inner = self.inner.lock();
        let max_points = inner.max_points;
        let list = inner.data.entry(name.to_string()).or_default();
        list.push_back(Sample::new(timestamp, value));
        Inner::truncate(list, max_points);
    }

    pub fn start(&self) {
        self.inner.lock().running = true;
    }

    pub fn stop(&self) {
        self.inner.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Drop all samples
    pub fn clear(&self) {
        self.inner.lock().data.clear();
    }

    /// Change the cap and re-truncate every list
    pub fn set_max_points(&self, max_points: usize) -> Result<()> {
        if max_points < 1 {
            return Err(ModlogError::validation(format!(
                "max_points must be at least 1, got {}",
                max_points
            )));
        }
        let mut inner = self.inner.lock();
        inner.max_points = max_points;
        for list in inner.data.values_mut() {
            Inner::truncate(list, max_points);
        }
        Ok(())
    }

    pub fn max_points(&self) -> usize {
        self.inner.lock().max_points
    }

    /// Samples for one register, oldest first
    pub fn get(&self, name: &str) -> Vec<Sample> {
        self.inner
            .lock()
            .data
            .get(name)
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, name: &str) -> Option<Sample> {
        self.inner.lock().data.get(name).and_then(|list| list.back().copied())
    }

    pub fn len(&self, name: &str) -> usize {
        self.inner.lock().data.get(name).map_or(0, VecDeque::len)
    }

    /// Consistent copy of everything
    pub fn snapshot(&self) -> HashMap<String, Vec<Sample>> {
        self.inner
            .lock()
            .data
            .iter()
            .map(|(name, list)| (name.clone(), list.iter().copied().collect()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().data.keys().cloned().collect();
        names.sort();
        names
    }
}
