//! Register and write descriptions
//!
//! Read kinds and write kinds are separate enums with separate token
//! vocabularies. Older configuration files used the read tokens `I_Float`,
//! `I_Int` and `Coils` to describe writes; those are only accepted through
//! [`WriteKind::from_legacy_token`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::history::{History, DEFAULT_HISTORY_CAPACITY};
use crate::error::{EncodeError, ModlogError, Result};

// ============================================================================
// Register kinds
// ============================================================================

/// Kind of a readable register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    #[serde(rename = "H_Float")]
    HoldingFloat32,
    #[serde(rename = "H_Int")]
    HoldingInt32,
    #[serde(rename = "I_Float")]
    InputFloat32,
    #[serde(rename = "I_Int")]
    InputInt32,
    #[serde(rename = "Coils")]
    Coil,
    #[serde(rename = "Discrete")]
    DiscreteInput,
}

impl RegisterKind {
    pub const ALL: [RegisterKind; 6] = [
        RegisterKind::HoldingFloat32,
        RegisterKind::HoldingInt32,
        RegisterKind::InputFloat32,
        RegisterKind::InputInt32,
        RegisterKind::Coil,
        RegisterKind::DiscreteInput,
    ];

    /// Configuration token
    pub fn token(self) -> &'static str {
        match self {
            RegisterKind::HoldingFloat32 => "H_Float",
            RegisterKind::HoldingInt32 => "H_Int",
            RegisterKind::InputFloat32 => "I_Float",
            RegisterKind::InputInt32 => "I_Int",
            RegisterKind::Coil => "Coils",
            RegisterKind::DiscreteInput => "Discrete",
        }
    }

    /// Modbus read function code for this kind
    pub fn function_code(self) -> u8 {
        match self {
            RegisterKind::Coil => 0x01,
            RegisterKind::DiscreteInput => 0x02,
            RegisterKind::HoldingFloat32 | RegisterKind::HoldingInt32 => 0x03,
            RegisterKind::InputFloat32 | RegisterKind::InputInt32 => 0x04,
        }
    }

    /// Single-bit kinds (coils, discrete inputs)
    pub fn is_bit(self) -> bool {
        matches!(self, RegisterKind::Coil | RegisterKind::DiscreteInput)
    }

    pub fn is_float(self) -> bool {
        matches!(self, RegisterKind::HoldingFloat32 | RegisterKind::InputFloat32)
    }

    /// Matching write kind, if the protocol can write this register
    pub fn writable(self) -> Option<WriteKind> {
        match self {
            RegisterKind::HoldingFloat32 => Some(WriteKind::HoldingFloat32Write),
            RegisterKind::HoldingInt32 => Some(WriteKind::HoldingInt32Write),
            RegisterKind::Coil => Some(WriteKind::CoilWrite),
            RegisterKind::InputFloat32 | RegisterKind::InputInt32 | RegisterKind::DiscreteInput => {
                None
            },
        }
    }

    /// Whether `word_count` is legal for this kind
    pub fn accepts_word_count(self, word_count: u16) -> bool {
        if self.is_bit() {
            word_count == 1
        } else {
            word_count == 1 || word_count == 2
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for RegisterKind {
    type Err = ModlogError;

    fn from_str(s: &str) -> Result<Self> {
        RegisterKind::ALL
            .into_iter()
            .find(|k| k.token() == s.trim())
            .ok_or_else(|| ModlogError::config(format!("Unknown register kind: {}", s)))
    }
}

// ============================================================================
// Write kinds
// ============================================================================

/// Kind of a writable register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteKind {
    #[serde(rename = "WH_Float")]
    HoldingFloat32Write,
    #[serde(rename = "WH_Int")]
    HoldingInt32Write,
    #[serde(rename = "W_Coil")]
    CoilWrite,
}

impl WriteKind {
    pub const ALL: [WriteKind; 3] = [
        WriteKind::HoldingFloat32Write,
        WriteKind::HoldingInt32Write,
        WriteKind::CoilWrite,
    ];

    pub fn token(self) -> &'static str {
        match self {
            WriteKind::HoldingFloat32Write => "WH_Float",
            WriteKind::HoldingInt32Write => "WH_Int",
            WriteKind::CoilWrite => "W_Coil",
        }
    }

    /// Map the old write tokens (`I_Float`, `I_Int`, `Coils`) onto write kinds
    pub fn from_legacy_token(token: &str) -> std::result::Result<Self, EncodeError> {
        match token.trim() {
            "I_Float" => Ok(WriteKind::HoldingFloat32Write),
            "I_Int" => Ok(WriteKind::HoldingInt32Write),
            "Coils" => Ok(WriteKind::CoilWrite),
            other => Err(EncodeError::UnsupportedOperation(format!(
                "unknown legacy write type: {}",
                other
            ))),
        }
    }

    /// Number of 16-bit words written
    pub fn word_count(self) -> u16 {
        match self {
            WriteKind::CoilWrite => 1,
            WriteKind::HoldingFloat32Write | WriteKind::HoldingInt32Write => 2,
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for WriteKind {
    type Err = EncodeError;

    fn from_str(s: &str) -> std::result::Result<Self, EncodeError> {
        let s = s.trim();
        if let Some(kind) = WriteKind::ALL.into_iter().find(|k| k.token() == s) {
            return Ok(kind);
        }
        match RegisterKind::from_str(s) {
            Ok(read_kind) => Err(EncodeError::UnsupportedOperation(format!(
                "{} is a read kind; use {} for writes",
                read_kind,
                read_kind
                    .writable()
                    .map(WriteKind::token)
                    .unwrap_or("a writable holding register or coil")
            ))),
            Err(_) => Err(EncodeError::UnsupportedOperation(format!(
                "unsupported write type: {}",
                s
            ))),
        }
    }
}

// ============================================================================
// RegisterSpec
// ============================================================================

/// One readable register plus its bounded sample history
#[derive(Debug, Clone)]
pub struct RegisterSpec {
    name: String,
    device_id: u8,
    address: u16,
    word_count: u16,
    kind: RegisterKind,
    enabled: bool,
    history: History,
}

impl RegisterSpec {
    /// Create an enabled register with the default history capacity
    ///
    /// Fails with a configuration error when the word count does not fit the
    /// kind: bit kinds need 1 word, numeric kinds 1 (raw word) or 2.
    pub fn new(
        name: impl Into<String>,
        device_id: u8,
        address: u16,
        word_count: u16,
        kind: RegisterKind,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModlogError::config("Register name must not be empty"));
        }
        if !kind.accepts_word_count(word_count) {
            return Err(ModlogError::config(format!(
                "Register '{}': word count {} is invalid for {} (expected {})",
                name,
                word_count,
                kind,
                if kind.is_bit() { "1" } else { "1 or 2" }
            )));
        }

        Ok(Self {
            name,
            device_id,
            address,
            word_count,
            kind,
            enabled: true,
            history: History::with_capacity(DEFAULT_HISTORY_CAPACITY),
        })
    }

    /// Replace the history with an empty one of the given capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ModlogError::config(format!(
                "Register '{}': history capacity must be at least 1",
                self.name
            )));
        }
        self.history = History::with_capacity(capacity);
        Ok(self)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Same register description with an empty history
    pub fn detached(&self) -> Self {
        Self {
            name: self.name.clone(),
            device_id: self.device_id,
            address: self.address,
            word_count: self.word_count,
            kind: self.kind,
            enabled: self.enabled,
            history: History::with_capacity(self.history.capacity()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    #[inline]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[inline]
    pub fn word_count(&self) -> u16 {
        self.word_count
    }

    #[inline]
    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }
}

// ============================================================================
// WriteSpec
// ============================================================================

/// One writable register and the value to write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSpec {
    pub name: String,
    pub device_id: u8,
    pub address: u16,
    pub kind: WriteKind,
    pub value: f64,
}

impl WriteSpec {
    pub fn new(
        name: impl Into<String>,
        device_id: u8,
        address: u16,
        kind: WriteKind,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            device_id,
            address,
            kind,
            value,
        }
    }

    /// Derive a write targeting a readable register
    pub fn from_register(spec: &RegisterSpec, value: f64) -> std::result::Result<Self, EncodeError> {
        let kind = spec.kind().writable().ok_or_else(|| {
            EncodeError::UnsupportedOperation(format!(
                "register '{}' of type {} is read-only",
                spec.name(),
                spec.kind()
            ))
        })?;
        Ok(Self::new(spec.name(), spec.device_id(), spec.address(), kind, value))
    }

    /// Same write with a different value
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    // ========================================================================
    // Kind tokens
    // ========================================================================

    #[test]
    fn test_register_kind_tokens_round_trip() {
        for kind in RegisterKind::ALL {
            assert_eq!(kind.token().parse::<RegisterKind>().unwrap(), kind);
        }
        assert!("H_Double".parse::<RegisterKind>().is_err());
    }

    #[test]
    fn test_register_kind_serde_uses_tokens() {
        let kind: RegisterKind = serde_yaml::from_str("H_Float").unwrap();
        assert_eq!(kind, RegisterKind::HoldingFloat32);
        assert_eq!(serde_yaml::to_string(&RegisterKind::Coil).unwrap().trim(), "Coils");
    }

    #[test]
    fn test_write_tokens_are_distinct_from_read_tokens() {
        for kind in WriteKind::ALL {
            assert!(kind.token().parse::<RegisterKind>().is_err());
            assert_eq!(kind.token().parse::<WriteKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_read_token_rejected_as_write_kind() {
        let err = "I_Float".parse::<WriteKind>().unwrap_err();
        assert!(matches!(err, EncodeError::UnsupportedOperation(_)));
        assert!(err.to_string().contains("read kind"));
    }

    #[test]
    fn test_legacy_write_tokens() {
        assert_eq!(
            WriteKind::from_legacy_token("I_Float").unwrap(),
            WriteKind::HoldingFloat32Write
        );
        assert_eq!(
            WriteKind::from_legacy_token("I_Int").unwrap(),
            WriteKind::HoldingInt32Write
        );
        assert_eq!(WriteKind::from_legacy_token("Coils").unwrap(), WriteKind::CoilWrite);
        assert!(matches!(
            WriteKind::from_legacy_token("Discrete"),
            Err(EncodeError::UnsupportedOperation(_))
        ));
    }

    // ========================================================================
    // RegisterSpec validation
    // ========================================================================

    #[test]
    fn test_word_count_rules() {
        assert!(RegisterSpec::new("pv", 10, 1284, 2, RegisterKind::HoldingFloat32).is_ok());
        assert!(RegisterSpec::new("raw", 10, 1, 1, RegisterKind::InputInt32).is_ok());
        assert!(RegisterSpec::new("flag", 10, 0, 1, RegisterKind::Coil).is_ok());

        let err = RegisterSpec::new("flag", 10, 0, 2, RegisterKind::DiscreteInput).unwrap_err();
        assert!(matches!(err, ModlogError::ConfigError(_)));
        assert!(RegisterSpec::new("pv", 10, 0, 3, RegisterKind::HoldingFloat32).is_err());
        assert!(RegisterSpec::new("pv", 10, 0, 0, RegisterKind::HoldingInt32).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(RegisterSpec::new("  ", 1, 0, 2, RegisterKind::HoldingFloat32).is_err());
    }

    #[test]
    fn test_history_capacity_validation() {
        let spec = RegisterSpec::new("pv", 10, 0, 2, RegisterKind::HoldingFloat32).unwrap();
        assert_eq!(spec.history().capacity(), DEFAULT_HISTORY_CAPACITY);
        assert!(spec.clone().with_history_capacity(0).is_err());
        assert_eq!(spec.with_history_capacity(5).unwrap().history().capacity(), 5);
    }

    #[test]
    fn test_detached_drops_history() {
        let mut spec = RegisterSpec::new("pv", 10, 0, 2, RegisterKind::HoldingFloat32)
            .unwrap()
            .with_history_capacity(8)
            .unwrap();
        spec.history_mut()
            .push(crate::register::Sample::new(chrono::Local::now(), 1.0));

        let copy = spec.detached();
        assert!(copy.history().is_empty());
        assert_eq!(copy.history().capacity(), 8);
        assert_eq!(copy.address(), spec.address());
    }

    // ========================================================================
    // WriteSpec
    // ========================================================================

    #[test]
    fn test_write_from_register() {
        let holding = RegisterSpec::new("sp", 10, 1539, 2, RegisterKind::HoldingFloat32).unwrap();
        let write = WriteSpec::from_register(&holding, 25.0).unwrap();
        assert_eq!(write.kind, WriteKind::HoldingFloat32Write);
        assert_eq!(write.address, 1539);

        let input = RegisterSpec::new("pv", 10, 1284, 2, RegisterKind::InputFloat32).unwrap();
        assert!(matches!(
            WriteSpec::from_register(&input, 1.0),
            Err(EncodeError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_with_value() {
        let write = WriteSpec::new("out", 10, 3000, WriteKind::HoldingFloat32Write, 50.0);
        let changed = write.with_value(12.5);
        assert_eq!(changed.value, 12.5);
        assert_eq!(changed.name, "out");
    }
}
