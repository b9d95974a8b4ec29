//! Process runtime helpers

pub mod lifecycle;

pub use lifecycle::{CleanupError, CleanupReport, LifecycleManager};
