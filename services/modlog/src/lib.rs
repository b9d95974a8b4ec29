//! Modbus register logger
//!
//! Polls a configured set of Modbus registers, decodes them into samples,
//! keeps a bounded history per register and appends every pass to a CSV file.
//!
//! # Modules
//!
//! - `register`: register/write definitions, ring-buffer history, register store
//! - `codec`: word order helpers, response decoder, write encoder
//! - `transport`: transport trait, Modbus TCP client, in-memory mock device
//! - `sink`: flushed CSV sink
//! - `events`: typed poll events and the event bus
//! - `poll`: cooperative engine, background poller, concurrent state store
//! - `runtime`: LIFO lifecycle manager
//! - `config`, `bootstrap`: configuration and the binary's run loop

pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod poll;
pub mod register;
pub mod runtime;
pub mod sink;
pub mod time;
pub mod transport;

pub use config::ServiceConfig;
pub use error::{ModlogError, Result};
pub use events::{EventBus, PollEvent};
pub use poll::{BackgroundPoller, ConcurrentStateStore, PollEngine, PollMode, PollState, PollStrategy};
pub use register::{RegisterKind, RegisterSpec, RegisterStore, WriteKind, WriteSpec};
pub use runtime::LifecycleManager;
pub use sink::CsvSink;
