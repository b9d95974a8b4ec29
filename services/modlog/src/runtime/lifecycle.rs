//! LIFO resource teardown
//!
//! Resources are registered together with the closure that releases them.
//! `cleanup()` runs the closures newest-first; an error or a panic in one
//! closure is logged and recorded, and the remaining closures still run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, error, info};

type CleanupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct Entry {
    name: String,
    cleanup: CleanupFn,
}

/// A cleanup closure that returned an error or panicked
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cleanup of '{resource}' failed: {message}")]
pub struct CleanupError {
    pub resource: String,
    pub message: String,
}

/// What one `cleanup()` pass did, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Registry of resources released in reverse registration order
#[derive(Default)]
pub struct LifecycleManager {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        f.debug_struct("LifecycleManager").field("resources", &names).finish()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `resource`; `cleanup` receives it back at teardown
    pub fn register<R, F>(&mut self, name: impl Into<String>, resource: R, cleanup: F)
    where
        R: Send + 'static,
        F: FnOnce(R) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        debug!("Lifecycle: registered {}", name);
        self.entries.push(Entry {
            name,
            cleanup: Box::new(move || cleanup(resource)),
        });
    }

    /// Register a closure that owns nothing extra
    pub fn defer<F>(&mut self, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(name, (), move |()| cleanup());
    }

    /// Run every cleanup, newest first, and empty the registry
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.entries.is_empty() {
            return report;
        }

        info!("Releasing {} resources", self.entries.len());
        while let Some(Entry { name, cleanup }) = self.entries.pop() {
            let message = match panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                Ok(Ok(())) => {
                    debug!("Lifecycle: released {}", name);
                    report.succeeded.push(name);
                    continue;
                },
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            error!("Cleanup of {} failed: {}", name, message);
            report.failed.push(CleanupError {
                resource: name,
                message,
            });
        }
        report
    }

    /// Run `f` with a fresh manager and clean up when it returns
    pub fn scoped<T>(f: impl FnOnce(&mut LifecycleManager) -> T) -> (T, CleanupReport) {
        let mut manager = LifecycleManager::new();
        let value = f(&mut manager);
        let report = manager.cleanup();
        (value, report)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, oldest first
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.cleanup();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
