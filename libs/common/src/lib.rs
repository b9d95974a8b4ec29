//! `modlog` basic library
//!
//! Provides functions shared by all modlog binaries:
//! - logging initialization
//! - configuration loading (figment)
//! - graceful shutdown signal handling

pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use config_loader::load_config;
pub use logging::LogConfig;
