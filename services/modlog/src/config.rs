//! Service configuration
//!
//! Loaded through figment: built-in defaults, then the config file, then
//! `MODLOG_`-prefixed environment variables (`MODLOG_POLLING__INTERVAL_MS=500`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ModlogError, Result};
use crate::poll::{PollMode, DEFAULT_MAX_POINTS};
use crate::register::{
    RegisterKind, RegisterSpec, RegisterStore, WriteKind, WriteSpec, DEFAULT_HISTORY_CAPACITY,
};
use crate::sink;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MODLOG_";

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/modlog.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default = "default_registers")]
    pub registers: Vec<RegisterEntry>,
    #[serde(default = "default_writes")]
    pub writes: Vec<WriteEntry>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service: ServiceSection::default(),
            connection: ConnectionConfig::default(),
            polling: PollingConfig::default(),
            sink: SinkConfig::default(),
            registers: default_registers(),
            writes: default_writes(),
        }
    }
}

/// Service identity and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    pub name: String,
    pub log_level: String,
    /// Log file directory; `MODLOG_LOG_DIR` takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "modlog".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Tcp,
    /// In-memory device, no network
    Simulator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub kind: ConnectionKind,
    pub host: String,
    pub port: u16,
    /// Per-request timeout
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            kind: ConnectionKind::Tcp,
            host: "127.0.0.1".to_string(),
            port: 502,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub mode: PollMode,
    pub interval_ms: u64,
    /// Ring buffer size per register (cooperative mode)
    pub history_capacity: usize,
    /// Samples kept per register (background mode)
    pub max_points: usize,
    /// Bound on waiting for the background thread at stop
    pub join_timeout_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            mode: PollMode::Cooperative,
            interval_ms: 1000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_points: DEFAULT_MAX_POINTS,
            join_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub enabled: bool,
    /// May contain `{timestamp}`
    pub path: String,
}

impl SinkConfig {
    /// Path with `{timestamp}` expanded
    pub fn resolved_path(&self, now: &DateTime<Local>) -> PathBuf {
        sink::expand_path(&self.path, now)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "data/modbus_log_{timestamp}.csv".to_string(),
        }
    }
}

/// One register as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub name: String,
    #[serde(default = "default_device_id")]
    pub device_id: u8,
    pub address: u16,
    /// Defaults to 1 for coils and discrete inputs, 2 otherwise
    #[serde(default, alias = "count", skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u16>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: RegisterKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RegisterEntry {
    fn new(name: &str, address: u16, kind: RegisterKind) -> Self {
        Self {
            name: name.to_string(),
            device_id: 10,
            address,
            word_count: None,
            kind,
            enabled: true,
        }
    }

    /// Validate and build the runtime spec
    pub fn to_spec(&self, history_capacity: usize) -> Result<RegisterSpec> {
        let word_count = self
            .word_count
            .unwrap_or(if self.kind.is_bit() { 1 } else { 2 });
        Ok(
            RegisterSpec::new(&self.name, self.device_id, self.address, word_count, self.kind)?
                .with_history_capacity(history_capacity)?
                .with_enabled(self.enabled),
        )
    }
}

/// One write target as written in the config file
///
/// `type` takes the write tokens (`WH_Float`, `WH_Int`, `W_Coil`); the old
/// tokens `I_Float`, `I_Int` and `Coils` are still accepted with a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteEntry {
    pub name: String,
    #[serde(default = "default_device_id")]
    pub device_id: u8,
    pub address: u16,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default)]
    pub value: f64,
}

impl WriteEntry {
    fn new(name: &str, address: u16, kind: WriteKind, value: f64) -> Self {
        Self {
            name: name.to_string(),
            device_id: 10,
            address,
            kind: kind.token().to_string(),
            value,
        }
    }

    pub fn write_kind(&self) -> Result<WriteKind> {
        match self.kind.parse::<WriteKind>() {
            Ok(kind) => Ok(kind),
            Err(parse_err) => match WriteKind::from_legacy_token(&self.kind) {
                Ok(kind) => {
                    warn!(
                        "Write '{}' uses legacy type '{}'; use '{}' instead",
                        self.name, self.kind, kind
                    );
                    Ok(kind)
                },
                Err(_) => Err(ModlogError::config(format!(
                    "write '{}': {}",
                    self.name, parse_err
                ))),
            },
        }
    }

    pub fn to_spec(&self) -> Result<WriteSpec> {
        if self.name.trim().is_empty() {
            return Err(ModlogError::config("write name must not be empty"));
        }
        Ok(WriteSpec::new(
            &self.name,
            self.device_id,
            self.address,
            self.write_kind()?,
            self.value,
        ))
    }
}

fn default_device_id() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_registers() -> Vec<RegisterEntry> {
    vec![
        RegisterEntry::new("output", 3335, RegisterKind::HoldingFloat32),
        RegisterEntry::new("pv", 1284, RegisterKind::HoldingFloat32),
        RegisterEntry::new("setpoint", 1539, RegisterKind::HoldingFloat32),
    ]
}

fn default_writes() -> Vec<WriteEntry> {
    vec![
        WriteEntry::new("setpoint_write", 1539, WriteKind::HoldingFloat32Write, 25.0),
        WriteEntry::new("enable_output", 2000, WriteKind::CoilWrite, 1.0),
        WriteEntry::new("manual_output", 3000, WriteKind::HoldingFloat32Write, 50.0),
    ]
}

impl ServiceConfig {
    /// Load from defaults, file and environment, then validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: ServiceConfig = common::load_config(path, ENV_PREFIX)
            .map_err(|e| ModlogError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail once polling has started
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(ModlogError::config("polling.interval_ms must be greater than 0"));
        }
        if self.polling.history_capacity == 0 {
            return Err(ModlogError::config("polling.history_capacity must be at least 1"));
        }
        if self.polling.max_points == 0 {
            return Err(ModlogError::config("polling.max_points must be at least 1"));
        }
        if self.connection.kind == ConnectionKind::Tcp {
            if self.connection.host.trim().is_empty() {
                return Err(ModlogError::config("connection.host must not be empty"));
            }
            if self.connection.port == 0 {
                return Err(ModlogError::config("connection.port must not be 0"));
            }
        }
        if self.sink.enabled && self.sink.path.trim().is_empty() {
            return Err(ModlogError::config("sink.path must not be empty"));
        }

        let mut seen = HashSet::new();
        for entry in &self.registers {
            if !seen.insert(entry.name.as_str()) {
                return Err(ModlogError::config(format!(
                    "duplicate register name '{}'",
                    entry.name
                )));
            }
        }
        let mut seen = HashSet::new();
        for entry in &self.writes {
            if !seen.insert(entry.name.as_str()) {
                return Err(ModlogError::config(format!("duplicate write name '{}'", entry.name)));
            }
        }

        self.build_store()?;
        self.write_specs()?;
        Ok(())
    }

    /// Register store in configuration order
    pub fn build_store(&self) -> Result<RegisterStore> {
        self.registers
            .iter()
            .map(|entry| {
                entry
                    .to_spec(self.polling.history_capacity)
                    .map_err(|e| ModlogError::config(format!("register '{}': {}", entry.name, e)))
            })
            .collect()
    }

    pub fn write_specs(&self) -> Result<Vec<WriteSpec>> {
        self.writes.iter().map(WriteEntry::to_spec).collect()
    }

    pub fn find_write(&self, name: &str) -> Result<WriteSpec> {
        self.writes
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| ModlogError::config(format!("no write named '{}'", name)))?
            .to_spec()
    }
}
