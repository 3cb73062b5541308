//! S3 Credentials Module
//!
//! Resolves the storage endpoint, bucket and key pair from the environment.
//!
//! # Design
//!
//! Values are read at call time, never at process start, so a changed
//! environment takes effect without a restart. Nothing is cached between calls.
//!
//! - `CredentialSource` trait defines the interface
//! - `EnvCredentials` reads the process environment on every `resolve()`
//! - `StaticCredentials` holds fixed values (tests, embedding)
//!
//! # Example
//!
//! ```
//! use clipvault::s3::credentials::{CredentialSource, StaticCredentials, StorageCredentials};
//!
//! let source = StaticCredentials::new(StorageCredentials::new(
//!     "s3.us-west-004.backblazeb2.com",
//!     "media",
//!     "key-id",
//!     "app-key",
//! ));
//!
//! let resolved = source.resolve();
//! assert!(resolved.is_valid);
//! assert_eq!(resolved.credentials.region(), "us-west-004");
//! ```

use crate::auth::sigv4::uri_encode_path;
use std::fmt;
use thiserror::Error;

/// Endpoint of the S3-compatible store (scheme optional)
pub const ENV_ENDPOINT: &str = "B2_ENDPOINT";
/// Bucket holding all media assets
pub const ENV_BUCKET: &str = "B2_BUCKET_NAME";
/// Access key id
pub const ENV_KEY_ID: &str = "B2_KEY_ID";
/// Secret application key
pub const ENV_APP_KEY: &str = "B2_APPLICATION_KEY";
/// Optional signing region override
pub const ENV_REGION: &str = "B2_REGION";

const DEFAULT_REGION: &str = "us-east-1";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Storage credentials and addressing for one call
///
/// Immutable snapshot. The endpoint is normalized to carry a scheme and no
/// trailing slash.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    endpoint: String,
    bucket: String,
    key_id: String,
    app_key: String,
    region: String,
}

impl StorageCredentials {
    /// Create credentials, deriving the region from the endpoint host
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        key_id: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Self {
        let endpoint = normalize_endpoint(&endpoint.into());
        let region = region_from_endpoint(&endpoint).unwrap_or_else(|| DEFAULT_REGION.to_string());
        Self {
            endpoint,
            bucket: bucket.into().trim().to_string(),
            key_id: key_id.into().trim().to_string(),
            app_key: app_key.into().trim().to_string(),
            region,
        }
    }

    /// Override the signing region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        if !region.trim().is_empty() {
            self.region = region.trim().to_string();
        }
        self
    }

    /// Endpoint URL, e.g. `https://s3.us-west-004.backblazeb2.com`
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Access key id
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Secret application key
    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Signing region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Short, log-safe prefix of the key id
    pub fn key_id_hint(&self) -> String {
        let prefix: String = self.key_id.chars().take(4).collect();
        format!("{}****", prefix)
    }

    /// Public URL of an object, `<endpoint>/<bucket>/<encoded key>`
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.bucket,
            uri_encode_path(key.trim_start_matches('/'))
        )
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("key_id", &self.key_id_hint())
            .field("app_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Result of one resolution pass
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub credentials: StorageCredentials,
    /// True iff both key fields are non-empty
    pub is_valid: bool,
}

impl ResolvedConfig {
    fn from_credentials(credentials: StorageCredentials) -> Self {
        let is_valid = !credentials.key_id.is_empty() && !credentials.app_key.is_empty();
        Self {
            credentials,
            is_valid,
        }
    }

    /// Fail fast unless everything a network call needs is present
    pub fn require_valid(self) -> Result<StorageCredentials, CredentialsError> {
        let creds = &self.credentials;
        let missing: Vec<&str> = [
            (ENV_ENDPOINT, creds.endpoint.is_empty()),
            (ENV_BUCKET, creds.bucket.is_empty()),
            (ENV_KEY_ID, creds.key_id.is_empty()),
            (ENV_APP_KEY, creds.app_key.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(CredentialsError::MissingCredentials(format!(
                "{} not set",
                missing.join(", ")
            )));
        }

        Ok(self.credentials)
    }
}

/// Trait for credential sources
///
/// Implementations must resolve fresh values on every call.
pub trait CredentialSource: Send + Sync {
    /// Resolve credentials for a single operation
    fn resolve(&self) -> ResolvedConfig;
}

/// Environment credentials source
///
/// Reads `B2_ENDPOINT`, `B2_BUCKET_NAME`, `B2_KEY_ID`, `B2_APPLICATION_KEY`
/// and the optional `B2_REGION` on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn resolve(&self) -> ResolvedConfig {
        resolve_config()
    }
}

/// Static credentials source
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: StorageCredentials,
}

impl StaticCredentials {
    /// Create a new static credentials source
    pub fn new(credentials: StorageCredentials) -> Self {
        Self { credentials }
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve(&self) -> ResolvedConfig {
        ResolvedConfig::from_credentials(self.credentials.clone())
    }
}

/// Resolve credentials from the process environment
pub fn resolve_config() -> ResolvedConfig {
    resolve_with(|name| std::env::var(name).ok())
}

/// Resolve credentials through an arbitrary variable lookup
pub fn resolve_with<F>(lookup: F) -> ResolvedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).unwrap_or_default();

    let mut credentials = StorageCredentials::new(
        get(ENV_ENDPOINT),
        get(ENV_BUCKET),
        get(ENV_KEY_ID),
        get(ENV_APP_KEY),
    );
    if let Some(region) = lookup(ENV_REGION) {
        credentials = credentials.with_region(region);
    }

    ResolvedConfig::from_credentials(credentials)
}

/// Prefix `https://` when no scheme is given and drop trailing slashes
fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Extract `<region>` from hosts shaped like `s3.<region>.example.com`
fn region_from_endpoint(endpoint: &str) -> Option<String> {
    let host = endpoint
        .split("://")
        .nth(1)
        .unwrap_or(endpoint)
        .split(['/', ':'])
        .next()?;

    let mut labels = host.split('.');
    if labels.next()? != "s3" {
        return None;
    }
    let region = labels.next()?;
    // Bare `s3.amazonaws.com` carries no region label
    if region.is_empty() || labels.count() < 2 {
        return None;
    }
    Some(region.to_string())
}
