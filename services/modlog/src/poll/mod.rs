//! Poll strategies
//!
//! Two interchangeable ways of running the poll loop:
//! - [`PollEngine`]: cooperative, one pass per external `tick()` call, history
//!   in the [`RegisterStore`](crate::register::RegisterStore) ring buffers, every
//!   row flushed to the CSV sink.
//! - [`BackgroundPoller`]: a dedicated thread that paces itself, history in the
//!   [`ConcurrentStateStore`], one batch event per pass.
//!
//! Only one strategy should drive a given transport at a time.

pub mod background;
pub mod engine;
pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::events::PollEvent;

pub use background::BackgroundPoller;
pub use engine::{PollEngine, TickReport};
pub use state::{ConcurrentStateStore, DEFAULT_MAX_POINTS};

/// Which strategy drives polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    #[default]
    Cooperative,
    Background,
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollMode::Cooperative => write!(f, "cooperative"),
            PollMode::Background => write!(f, "background"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running,
    /// Stop requested, worker not yet exited
    Stopping,
}

/// Operations shared by both strategies
///
/// Starting differs per strategy (sink path vs. store/transport/interval) and
/// stays on the concrete types.
pub trait PollStrategy: Send {
    fn mode(&self) -> PollMode;

    fn state(&self) -> PollState;

    fn is_running(&self) -> bool {
        self.state() == PollState::Running
    }

    /// Stop polling; no data events are published once this returns
    fn stop(&mut self);

    fn subscribe(&self) -> UnboundedReceiver<PollEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde() {
        let mode: PollMode = serde_yaml::from_str("background").unwrap_or_default();
        assert_eq!(mode, PollMode::Background);
        assert_eq!(PollMode::default(), PollMode::Cooperative);
        assert_eq!(PollMode::Cooperative.to_string(), "cooperative");
    }
}
