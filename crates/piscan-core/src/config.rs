//! Scanner configuration.
//!
//! Handles loading, saving, and validating PiScan configuration including:
//! - Validator base URL, endpoint paths and client identifier
//! - Request timeout and retry budget
//! - Guard cooldown for the scan controller
//! - Display timezone and history page size
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! `PISCAN_`-prefixed environment variables with `__` between sections
//! (`PISCAN_BACKEND__BASE_URL=http://10.0.0.5:3002`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::DisplayZone;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PISCAN";

/// Client identifier sent as `User-Agent`.
pub const DEFAULT_CLIENT_ID: &str = "PiScan/1.0.0";

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Sources could not be read or merged into [`ScannerConfig`].
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteError {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an unusable value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `request.max_attempts`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold unusable values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Remote validator connection.
    pub backend: BackendConfig,

    /// Timeout and retry policy for every request.
    pub request: RequestConfig,

    /// Scan controller tuning.
    pub scanner: ScanConfig,

    /// Presentation of times and history.
    pub display: DisplayConfig,
}

/// Remote validator connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base address that relative endpoint paths are appended to.
    pub base_url: String,

    /// Fixed client identifier sent with every request.
    pub client_id: String,

    /// Identifier of this scanning station, sent as `validatedBy`.
    pub validated_by: String,

    /// Endpoint paths.
    pub endpoints: Endpoints,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3002".to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            validated_by: "mobile-scanner".to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

/// Endpoint paths on the validator. Absolute URLs are used unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Ticket validation, `POST`.
    pub validate: String,
    /// Recent validations, `GET`.
    pub history: String,
    /// Aggregate counters, `GET`.
    pub stats: String,
    /// Liveness check, `GET`.
    pub health: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            validate: "/validate".to_string(),
            history: "/history".to_string(),
            stats: "/stats".to_string(),
            health: "/health".to_string(),
        }
    }
}

/// Request timeout and retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Total attempts per request, including the first.
    pub max_attempts: u32,

    /// Fixed wait between failed attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl RequestConfig {
    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait between failed attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Scan controller tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How long the mutual-exclusion guard outlives a result, in milliseconds.
    pub guard_cooldown_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            guard_cooldown_ms: 1_000,
        }
    }
}

impl ScanConfig {
    /// Guard cooldown after a cycle resolves.
    #[must_use]
    pub const fn guard_cooldown(&self) -> Duration {
        Duration::from_millis(self.guard_cooldown_ms)
    }
}

/// Presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// `"local"` for the device zone, or an IANA name such as `America/Chicago`.
    pub timezone: String,

    /// Entries fetched by the history view.
    pub history_limit: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "local".to_string(),
            history_limit: 50,
        }
    }
}

impl DisplayConfig {
    /// The configured zone; unknown names fall back to the device zone.
    #[must_use]
    pub fn zone(&self) -> DisplayZone {
        self.timezone.parse().unwrap_or_default()
    }
}

impl ScannerConfig {
    /// Loads configuration from defaults, a TOML file and the environment.
    ///
    /// With `path` set, the file must exist. Without it, the platform default
    /// location is used if a file is present there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing (explicit path only), cannot be
    /// parsed, or the merged values fail [`ScannerConfig::validate`].
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let defaults = ::config::Config::try_from(&Self::default())?;
        let mut builder = ::config::Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                builder = builder.add_source(
                    ::config::File::from(path).format(::config::FileFormat::Toml),
                );
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(
                        ::config::File::from(path)
                            .format(::config::FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        let loaded: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Writes the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_error = |source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Checks every field and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: String| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message,
            });
        };

        if let Err(e) = url::Url::parse(&self.backend.base_url) {
            invalid(
                "backend.base_url",
                format!("'{}' is not a valid URL ({e})", self.backend.base_url),
            );
        }
        if self.backend.client_id.trim().is_empty() {
            invalid("backend.client_id", "must not be empty".to_string());
        }
        if self.backend.validated_by.trim().is_empty() {
            invalid("backend.validated_by", "must not be empty".to_string());
        }
        let endpoints = &self.backend.endpoints;
        for (field, value) in [
            ("backend.endpoints.validate", &endpoints.validate),
            ("backend.endpoints.history", &endpoints.history),
            ("backend.endpoints.stats", &endpoints.stats),
            ("backend.endpoints.health", &endpoints.health),
        ] {
            if !is_valid_endpoint(value) {
                invalid(
                    field,
                    format!("'{value}' must start with '/' or be an absolute http(s) URL"),
                );
            }
        }

        if self.request.max_attempts == 0 {
            invalid("request.max_attempts", "must be at least 1".to_string());
        }
        if self.request.timeout_ms == 0 {
            invalid("request.timeout_ms", "must be greater than 0".to_string());
        }

        if !is_valid_timezone(&self.display.timezone) {
            invalid(
                "display.timezone",
                format!(
                    "unknown timezone '{}'. Use 'local' or an IANA name (e.g. 'America/Chicago')",
                    self.display.timezone
                ),
            );
        }
        if self.display.history_limit == 0 {
            invalid("display.history_limit", "must be at least 1".to_string());
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Platform config file location, e.g. `~/.config/piscan/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "piscan")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Returns `true` for `"local"` (or an empty value) or a known IANA timezone name.
#[must_use]
pub fn is_valid_timezone(name: &str) -> bool {
    name.parse::<DisplayZone>().is_ok()
}

fn is_valid_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with('/') || endpoint.starts_with("http://") || endpoint.starts_with("https://")
}
