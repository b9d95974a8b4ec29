//! Register descriptions, sample history and the register store

pub mod history;
pub mod spec;
pub mod store;

pub use history::{History, Sample, DEFAULT_HISTORY_CAPACITY};
pub use spec::{RegisterKind, RegisterSpec, WriteKind, WriteSpec};
pub use store::RegisterStore;
