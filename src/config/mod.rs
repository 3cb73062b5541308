//! Configuration module for Clipvault
//!
//! Handles loading and parsing of YAML settings files with support for
//! environment variable expansion and validation.
//!
//! Settings hold tunables only. Endpoint, bucket and keys are never read from
//! here; they are resolved from the environment on every call by
//! [`crate::s3::credentials`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Upper bound the list API accepts for `max-keys`
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub listing: ListingSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Settings {
    /// Load settings from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Load settings from a file when given, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transport;
        for (name, value) in [
            ("transport.connect_timeout_secs", t.connect_timeout_secs),
            ("transport.read_timeout_secs", t.read_timeout_secs),
            ("transport.request_timeout_secs", t.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if t.connect_timeout_secs > t.request_timeout_secs {
            return Err(ConfigError::ValidationError(
                "transport.connect_timeout_secs cannot exceed transport.request_timeout_secs"
                    .into(),
            ));
        }

        if t.presign_expiry_secs == 0 || t.presign_expiry_secs > 604_800 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid presign expiry {}s: must be between 1 and 604800",
                t.presign_expiry_secs
            )));
        }

        if t.sdk_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "transport.sdk_max_attempts must be at least 1".into(),
            ));
        }

        if self.listing.page_size == 0 || self.listing.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "Invalid listing.page_size {}: must be between 1 and {}",
                self.listing.page_size, MAX_PAGE_SIZE
            )));
        }

        if self.listing.max_pages == Some(0) {
            return Err(ConfigError::ValidationError(
                "listing.max_pages must be at least 1 when set".into(),
            ));
        }

        if self.sync.owner_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::ValidationError(
                "sync.owner_prefix cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Transport configuration shared by all upload strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Connection establishment bound
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Socket-level read stall bound, independent of the total
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request duration bound; payloads can be hundreds of MB
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_secs: u64,
    #[serde(default = "default_sdk_max_attempts")]
    pub sdk_max_attempts: u32,
    #[serde(default = "default_sdk_initial_backoff")]
    pub sdk_initial_backoff_ms: u64,
    /// Skip certificate verification for clients built from these settings.
    /// Local development only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TransportSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_secs)
    }

    pub fn sdk_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.sdk_initial_backoff_ms)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            request_timeout_secs: default_request_timeout(),
            presign_expiry_secs: default_presign_expiry(),
            sdk_max_attempts: default_sdk_max_attempts(),
            sdk_initial_backoff_ms: default_sdk_initial_backoff(),
            accept_invalid_certs: false,
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    120
}

fn default_request_timeout() -> u64 {
    600 // 10 minutes
}

fn default_presign_expiry() -> u64 {
    3600
}

fn default_sdk_max_attempts() -> u32 {
    5
}

fn default_sdk_initial_backoff() -> u64 {
    500
}

/// Remote listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Optional cap on pages fetched; unset follows continuation tokens to the end
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: None,
        }
    }
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Count difference above which incremental sync is considered unsafe
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: usize,
    /// Owner namespace root; owner `42` lives under `<owner_prefix>/42/`
    #[serde(default = "default_owner_prefix")]
    pub owner_prefix: String,
}

impl SyncSettings {
    /// Key prefix scoping one owner's objects
    pub fn owner_prefix_for(&self, owner_id: &str) -> String {
        format!("{}/{}/", self.owner_prefix.trim_matches('/'), owner_id)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            drift_threshold: default_drift_threshold(),
            owner_prefix: default_owner_prefix(),
        }
    }
}

fn default_drift_threshold() -> usize {
    5
}

fn default_owner_prefix() -> String {
    "users".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_log_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_json() -> bool {
    true
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
