//! Error types for the scan-validation pipeline.
//!
//! Errors are plain values returned up the call chain and pattern-matched by
//! callers; there is no process-wide handler registry. The scan controller
//! absorbs [`TransportError`] and [`FormatError`] into displayable results,
//! so the only session-level failure a screen sees is
//! [`PiscanError::CameraPermissionDenied`].
//!
//! # Example
//!
//! ```rust
//! use piscan_core::error::{PiscanError, TransportError};
//!
//! let err: PiscanError = TransportError::Timeout { attempts: 3 }.into();
//! assert!(err.is_transport_error());
//! assert_eq!(err.error_code(), "NETWORK_ERROR");
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::validation::FormatError;

/// Failure of the request client after its retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The last attempt was aborted by the per-attempt timeout.
    #[error("Request timeout after all retries ({attempts} attempts)")]
    Timeout {
        /// Attempts made.
        attempts: u32,
    },

    /// Every attempt failed and the last one was not a timeout.
    #[error("Network error after {attempts} attempts: {message}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// HTTP status of the last attempt, when one was received.
        status: Option<u16>,
        /// Description of the last failure.
        message: String,
    },

    /// The endpoint could not be turned into a URL; no attempt was made.
    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as built from base address and endpoint.
        url: String,
        /// Parser complaint.
        reason: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// The request body could not be serialized; no attempt was made.
    #[error("Failed to encode request body: {0}")]
    Encode(String),
}

impl TransportError {
    /// Returns `true` if the failure was a timeout.
    #[inline]
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// The unified error type for PiScan operations.
#[derive(Debug, Error)]
pub enum PiscanError {
    // =========================================================================
    // SCANNING ERRORS
    // =========================================================================
    /// The camera may not be used; the scan session cannot start.
    #[error("Camera permission is required to scan tickets.")]
    CameraPermissionDenied,

    /// A scanned code failed the local format check.
    #[error("Invalid code format: {0}")]
    InvalidCodeFormat(#[from] FormatError),

    // =========================================================================
    // NETWORK ERRORS
    // =========================================================================
    /// The validator could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// Reading or writing a file failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for PiScan operations.
pub type Result<T> = std::result::Result<T, PiscanError>;

impl PiscanError {
    /// Returns `true` if the validator could not be reached.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if the whole scan session, not just one cycle, is over.
    #[inline]
    #[must_use]
    pub const fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::CameraPermissionDenied)
    }

    /// Returns `true` if retrying later may succeed without operator action.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(err) => !matches!(
                err,
                TransportError::InvalidUrl { .. }
                    | TransportError::ClientBuild(_)
                    | TransportError::Encode(_)
            ),
            Self::InvalidCodeFormat(_) => true,
            _ => false,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CameraPermissionDenied => "PERMISSION_ERROR",
            Self::InvalidCodeFormat(_) => "VALIDATION_ERROR",
            Self::Transport(TransportError::Exhausted {
                status: Some(_), ..
            }) => "BACKEND_ERROR",
            Self::Transport(_) => "NETWORK_ERROR",
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_) => {
                "CONFIG_ERROR"
            }
            Self::PersistenceError(_) | Self::IoError(_) => "IO_ERROR",
        }
    }

    /// A short message suitable for showing to the operator.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self.error_code() {
            "PERMISSION_ERROR" => "Camera permission is required to scan tickets.",
            "VALIDATION_ERROR" => "Ticket validation failed. Please try again.",
            "BACKEND_ERROR" => "Server error. Please try again later.",
            "NETWORK_ERROR" => "Network connection failed. Please check your internet connection.",
            "CONFIG_ERROR" => "Configuration is invalid. Check the PiScan config file.",
            _ => "An unexpected error occurred. Please try again.",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for PiscanError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_transport_classification() {
        let err: PiscanError = TransportError::Timeout { attempts: 3 }.into();
        assert!(err.is_transport_error());
        assert!(err.is_recoverable());
        assert!(!err.is_fatal_to_session());
        assert_eq!(err.error_code(), "NETWORK_ERROR");
    }

    #[test]
    fn test_backend_status_maps_to_backend_error() {
        let err: PiscanError = TransportError::Exhausted {
            attempts: 3,
            status: Some(503),
            message: "HTTP error! status: 503".into(),
        }
        .into();
        assert_eq!(err.error_code(), "BACKEND_ERROR");
        assert_eq!(err.user_message(), "Server error. Please try again later.");
    }

    #[test]
    fn test_invalid_url_is_not_recoverable() {
        let err: PiscanError = TransportError::InvalidUrl {
            url: "nope".into(),
            reason: "relative URL without a base".into(),
        }
        .into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_permission_is_fatal() {
        let err = PiscanError::CameraPermissionDenied;
        assert!(err.is_fatal_to_session());
        assert_eq!(err.error_code(), "PERMISSION_ERROR");
        assert!(err.user_message().contains("Camera permission"));
    }

    #[test]
    fn test_format_error_conversion() {
        let err: PiscanError = FormatError::Empty.into();
        assert!(matches!(err, PiscanError::InvalidCodeFormat(FormatError::Empty)));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: PiscanError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "request.max_attempts".into(),
                message: "must be at least 1".into(),
            },
            ConfigError::ValidationError {
                field: "display.timezone".into(),
                message: "unknown timezone 'Nowhere'".into(),
            },
        ])
        .into();
        assert!(err.is_config_error());
        let text = err.to_string();
        assert!(text.contains("request.max_attempts"));
        assert!(text.contains("display.timezone"));
    }

    #[test]
    fn test_from_io_error() {
        let err: PiscanError = IoErr::new(ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, PiscanError::IoError(_)));
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PiscanError>();
        assert_sync::<PiscanError>();
    }
}
