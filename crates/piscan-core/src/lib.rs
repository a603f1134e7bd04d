//! # piscan-core
//!
//! Scan-validation pipeline for the PiScan ticket scanner.
//!
//! This crate provides:
//! - A scan session state machine that sends each physical ticket to the
//!   validator at most once
//! - A resilient HTTP client for the remote validator (timeouts, bounded retry)
//! - Normalization of validator payloads, history and stats into strict shapes
//! - Timezone-aware rendering of backend timestamps
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`validation`] - Cheap format pre-filter for decoded codes
//! - [`client`] - Request client for the remote validator
//! - [`normalize`] - Payload coercion and duplicate classification
//! - [`time`] - Timestamp parsing, display and relative labels
//! - [`scanner`] - The scan controller that ties the above together
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Wire and display types shared across modules

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod scanner;
pub mod time;
pub mod types;
pub mod validation;

// Re-export primary types for convenience
pub use client::{BackendClient, RequestOptions, RetryPolicy};
pub use config::{
    default_config_path, is_valid_timezone, BackendConfig, ConfigError, ConfigResult,
    DisplayConfig, Endpoints, RequestConfig, ScanConfig, ScannerConfig,
};
pub use error::{PiscanError, Result, TransportError};
pub use normalize::{normalize, ResultKind, ValidationResult};
pub use scanner::{
    IgnoreReason, ScanController, ScanOutcome, ScanPhase, ScanSessionState, TicketValidator,
};
pub use time::{DisplayZone, ResultTime, TimeNormalizer};
pub use types::{
    ConnectionStatus, HistoryEntry, RawScanEvent, TicketHistoryItem, ValidateRequest,
    ValidationStats,
};
pub use validation::{check_code, is_valid_code, FormatError};
