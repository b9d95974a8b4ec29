//! Unified error handling for modlog services
//!
//! Service crates keep their own domain error enums and convert into
//! [`ServiceError`] at the process boundary (binary `main`, bootstrap).

use thiserror::Error;

// ============================================================================
// ServiceError - Main error type
// ============================================================================

/// Main error type for the modlog binaries
#[derive(Debug, Error)]
pub enum ServiceError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Protocol & Communication Errors
    // ======================================
    #[error("Protocol error: {protocol}: {message}")]
    Protocol { protocol: String, message: String },

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceErrorTrait for ServiceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::Communication(_) => "COMMUNICATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Runtime(_) => "RUNTIME_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::Protocol { .. } => ErrorCategory::Protocol,
            Self::Communication(_) => ErrorCategory::Network,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Runtime(_) | Self::Internal(_) => ErrorCategory::Internal,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Service Error Trait
// ============================================================================

/// Error category, used for classification and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Validation,
    Protocol,
    Connection,
    Storage,
    Internal,
    Unknown,
}

/// Common error capability trait
///
/// Each service keeps its own domain error type and gains error codes,
/// categories and log levels by implementing this trait.
pub trait ServiceErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Error code for logs
    fn error_code(&self) -> &'static str;

    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Connection
        )
    }

    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Storage => Level::ERROR,
            ErrorCategory::Validation => Level::INFO,
            _ => Level::WARN,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServiceError::Configuration("x".into()).error_code(),
            "CONFIGURATION_ERROR"
        );
        let io = ServiceError::from(std::io::Error::other("disk"));
        assert_eq!(io.error_code(), "IO_ERROR");
        assert_eq!(io.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_error_retryable() {
        assert!(ServiceError::Communication("lost".into()).is_retryable());
        assert!(!ServiceError::Validation("test".into()).is_retryable());
        assert!(!ServiceError::InvalidConfig {
            field: "config.ini".into(),
            reason: "unsupported".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(
            ServiceError::Internal("boom".into()).log_level(),
            tracing::Level::ERROR
        );
        assert_eq!(
            ServiceError::Communication("lost".into()).log_level(),
            tracing::Level::WARN
        );
        assert_eq!(
            ServiceError::Validation("bad".into()).log_level(),
            tracing::Level::INFO
        );
    }

    #[test]
    fn test_from_anyhow_is_other() {
        let err: ServiceError = anyhow::anyhow!("opaque").into();
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(err.to_string().contains("opaque"));
    }
}
