//! Error handling for the modlog service
//!
//! `ModlogError` covers configuration and runtime failures of the service.
//! The hot per-register paths use the narrower [`DecodeError`] and
//! [`EncodeError`] so a single bad register never turns into a service error.

use errors::{ErrorCategory, ServiceError, ServiceErrorTrait};
use thiserror::Error;

/// Modlog service error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModlogError {
    /// Configuration-related errors (including register invariant violations)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors (sink files)
    #[error("IO error: {0}")]
    IoError(String),

    /// Connection establishment and maintenance errors
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Protocol communication errors
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Validation errors (invalid parameter)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// State errors (already running, lock poisoned, thread spawn)
    #[error("State error: {0}")]
    StateError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the modlog service
pub type Result<T> = std::result::Result<T, ModlogError>;

impl ModlogError {
    pub fn config(msg: impl Into<String>) -> Self {
        ModlogError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        ModlogError::IoError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        ModlogError::ConnectionError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ModlogError::ProtocolError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ModlogError::ValidationError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        ModlogError::StateError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ModlogError::InternalError(msg.into())
    }

    pub fn not_connected() -> Self {
        ModlogError::ConnectionError("Not connected".to_string())
    }
}

// ============================================================================
// Per-register error kinds
// ============================================================================

/// Failure to turn a transport response into a sample
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No transport attached, or the transport reports it is not connected
    #[error("transport unavailable")]
    TransportUnavailable,

    /// The transport call failed or returned an exception response
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The response did not carry enough words/bits for the register kind
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure to turn a write request into a transport call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The register kind cannot be written
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The value cannot be represented by the target kind
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for ModlogError {
    fn from(err: std::io::Error) -> Self {
        ModlogError::IoError(err.to_string())
    }
}

impl From<csv::Error> for ModlogError {
    fn from(err: csv::Error) -> Self {
        ModlogError::IoError(format!("CSV: {err}"))
    }
}

impl From<EncodeError> for ModlogError {
    fn from(err: EncodeError) -> Self {
        ModlogError::ValidationError(err.to_string())
    }
}

impl From<DecodeError> for ModlogError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::TransportUnavailable => ModlogError::not_connected(),
            other => ModlogError::ProtocolError(other.to_string()),
        }
    }
}

// ============================================================================
// Conversion to ServiceError at the process boundary
// ============================================================================

impl From<ModlogError> for ServiceError {
    fn from(err: ModlogError) -> Self {
        match err {
            ModlogError::ConfigError(msg) => ServiceError::Configuration(msg),
            ModlogError::IoError(msg) => ServiceError::Io(std::io::Error::other(msg)),
            ModlogError::ConnectionError(msg) => ServiceError::Communication(msg),
            ModlogError::ProtocolError(msg) => ServiceError::Protocol {
                protocol: "modbus".to_string(),
                message: msg,
            },
            ModlogError::ValidationError(msg) => ServiceError::Validation(msg),
            ModlogError::StateError(msg) => ServiceError::Runtime(msg),
            ModlogError::InternalError(msg) => ServiceError::Internal(msg),
        }
    }
}

impl ServiceErrorTrait for ModlogError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "MODLOG_CONFIG_ERROR",
            Self::IoError(_) => "MODLOG_IO_ERROR",
            Self::ConnectionError(_) => "MODLOG_CONNECTION_ERROR",
            Self::ProtocolError(_) => "MODLOG_PROTOCOL_ERROR",
            Self::ValidationError(_) => "MODLOG_VALIDATION_ERROR",
            Self::StateError(_) => "MODLOG_STATE_ERROR",
            Self::InternalError(_) => "MODLOG_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError(_) => ErrorCategory::Configuration,
            Self::IoError(_) => ErrorCategory::Storage,
            Self::ConnectionError(_) => ErrorCategory::Connection,
            Self::ProtocolError(_) => ErrorCategory::Protocol,
            Self::ValidationError(_) => ErrorCategory::Validation,
            Self::StateError(_) | Self::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_display() {
        let err = ModlogError::config("bad word count");
        assert_eq!(err.to_string(), "Configuration error: bad word count");
        assert_eq!(ModlogError::not_connected().to_string(), "Connection error: Not connected");
    }

    #[test]
    fn test_service_error_conversion() {
        let err: ServiceError = ModlogError::protocol("exception 0x02").into();
        assert!(matches!(err, ServiceError::Protocol { .. }));

        let err: ServiceError = ModlogError::io("disk full").into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_categories() {
        assert!(ModlogError::connection("refused").is_retryable());
        assert!(!ModlogError::config("x").is_retryable());
        assert_eq!(ModlogError::io("x").log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: ModlogError = DecodeError::TransportUnavailable.into();
        assert_eq!(err, ModlogError::not_connected());

        let err: ModlogError = DecodeError::MalformedResponse("0 words".into()).into();
        assert!(matches!(err, ModlogError::ProtocolError(_)));
    }
}
