//! Read-only storage health check
//!
//! Lists a single page of at most one key and reports reachability and
//! latency. Never fails: every error becomes `healthy: false`.

use crate::config::Settings;
use crate::s3::credentials::CredentialSource;
use crate::s3::S3Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub bucket: String,
    pub endpoint: String,
    pub latency_ms: u64,
    pub sample_object_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    fn unhealthy(bucket: &str, endpoint: &str, latency_ms: u64, error: String) -> Self {
        Self {
            healthy: false,
            bucket: bucket.to_string(),
            endpoint: endpoint.to_string(),
            latency_ms,
            sample_object_count: 0,
            error: Some(error),
        }
    }
}

/// Probe the store behind `source`
#[tracing::instrument(name = "storage.health", skip_all)]
pub async fn check_health(source: &dyn CredentialSource, settings: &Settings) -> HealthReport {
    let resolved = source.resolve();
    let bucket = resolved.credentials.bucket().to_string();
    let endpoint = resolved.credentials.endpoint().to_string();

    let credentials = match resolved.require_valid() {
        Ok(credentials) => credentials,
        Err(e) => return HealthReport::unhealthy(&bucket, &endpoint, 0, e.to_string()),
    };
    let client = match S3Client::new(credentials, &settings.transport) {
        Ok(client) => client,
        Err(e) => return HealthReport::unhealthy(&bucket, &endpoint, 0, e.to_string()),
    };

    let started = Instant::now();
    let result = client.list_objects_page(None, None, 1).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(page) => {
            tracing::debug!(latency_ms = latency_ms, "Storage health check passed");
            HealthReport {
                healthy: true,
                bucket,
                endpoint,
                latency_ms,
                sample_object_count: page.objects.len(),
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, latency_ms = latency_ms, "Storage health check failed");
            HealthReport::unhealthy(&bucket, &endpoint, latency_ms, e.to_string())
        }
    }
}
