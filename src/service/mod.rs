//! Storage service facade
//!
//! The caller-facing surface: upload, sync, health and diagnostics listing.
//! Each method resolves credentials fresh, builds what it needs for that one
//! call, and delegates. No logic lives here beyond picking sync options.

use crate::config::Settings;
use crate::health::{check_health, HealthReport};
use crate::metrics;
use crate::s3::credentials::{CredentialSource, CredentialsError, EnvCredentials};
use crate::s3::{RemoteObject, S3Client, S3ClientError};
use crate::sync::{
    IndexError, LocalIndex, SmartSyncResult, SyncEngine, SyncError, SyncOptions, SyncProgress,
    SyncStrategy,
};
use crate::upload::orchestrator::UploadOrchestrator;
use crate::upload::{UploadError, UploadPayload, UploadResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Storage(#[from] S3ClientError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Diagnostics listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageListing {
    pub prefix: Option<String>,
    pub count: usize,
    pub total_size: u64,
    pub objects: Vec<RemoteObject>,
}

/// Outcome of [`StorageService::run_sync`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunReport {
    pub owner_id: String,
    pub strategy: SyncStrategy,
    /// Classifier rationale, present when the strategy was chosen automatically
    pub recommendation: Option<String>,
    pub dry_run: bool,
    pub progress: SyncProgress,
}

/// Storage service
pub struct StorageService {
    source: Arc<dyn CredentialSource>,
    settings: Settings,
    index: Arc<dyn LocalIndex>,
}

impl StorageService {
    pub fn new(
        source: Arc<dyn CredentialSource>,
        settings: Settings,
        index: Arc<dyn LocalIndex>,
    ) -> Self {
        Self {
            source,
            settings,
            index,
        }
    }

    /// Service reading credentials from the environment
    pub fn from_env(settings: Settings, index: Arc<dyn LocalIndex>) -> Self {
        Self::new(Arc::new(EnvCredentials), settings, index)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn client(&self) -> Result<S3Client, ServiceError> {
        let credentials = self.source.resolve().require_valid()?;
        Ok(S3Client::new(credentials, &self.settings.transport)?
            .with_listing(self.settings.listing.clone()))
    }

    fn engine(&self) -> Result<SyncEngine, ServiceError> {
        let client = self
            .client()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        Ok(SyncEngine::new(
            Arc::new(client),
            self.index.clone(),
            self.settings.sync.clone(),
        ))
    }

    /// Upload through the strategy chain
    pub async fn upload(
        &self,
        payload: impl Into<UploadPayload>,
        key: &str,
        content_type: &str,
    ) -> Result<UploadResult, UploadError> {
        UploadOrchestrator::new(self.source.clone(), self.settings.transport.clone())
            .upload_object(payload, key, content_type)
            .await
    }

    /// Classify drift for `owner_id` using the index's current count
    pub async fn smart_sync(&self, owner_id: &str) -> Result<SmartSyncResult, ServiceError> {
        let engine = self.engine()?;
        let local_count = self.index.count_by_owner(owner_id).await?;
        Ok(engine.smart_sync(owner_id, local_count).await?)
    }

    /// Diff and apply with explicit options
    pub async fn sync_with_progress(
        &self,
        owner_id: &str,
        options: SyncOptions,
    ) -> Result<SyncProgress, ServiceError> {
        Ok(self.engine()?.sync_with_progress(owner_id, options).await?)
    }

    /// Run a sync with `strategy`, or classify first when none is given
    ///
    /// `options` overrides the strategy's default options.
    #[tracing::instrument(name = "service.run_sync", skip(self, options), err)]
    pub async fn run_sync(
        &self,
        owner_id: &str,
        strategy: Option<SyncStrategy>,
        options: Option<SyncOptions>,
    ) -> Result<SyncRunReport, ServiceError> {
        let engine = self.engine()?;

        let (strategy, recommendation) = match strategy {
            Some(strategy) => (strategy, None),
            None => {
                let local_count = self.index.count_by_owner(owner_id).await?;
                let decision = engine.smart_sync(owner_id, local_count).await?;
                (decision.strategy, Some(decision.recommendation))
            }
        };

        let options = options.unwrap_or_else(|| strategy.default_options());
        let dry_run = options.dry_run;
        let result = engine.sync_with_progress(owner_id, options).await;
        metrics::record_sync_run(strategy.as_str(), result.is_ok());

        Ok(SyncRunReport {
            owner_id: owner_id.to_string(),
            strategy,
            recommendation,
            dry_run,
            progress: result?,
        })
    }

    /// Read-only health probe; never fails
    pub async fn health(&self) -> HealthReport {
        check_health(self.source.as_ref(), &self.settings).await
    }

    /// List remote objects for diagnostics
    pub async fn list_objects(&self, prefix: Option<&str>) -> Result<StorageListing, ServiceError> {
        let objects = self.client()?.list_objects(prefix).await?;
        Ok(StorageListing {
            prefix: prefix.map(str::to_string),
            count: objects.len(),
            total_size: objects.iter().map(|o| o.size).sum(),
            objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::credentials::{StaticCredentials, StorageCredentials};
    use crate::sync::InMemoryIndex;

    fn service_without_keys() -> StorageService {
        let creds = StorageCredentials::new("http://127.0.0.1:9000", "media", "", "");
        StorageService::new(
            Arc::new(StaticCredentials::new(creds)),
            Settings::default(),
            Arc::new(InMemoryIndex::new()),
        )
    }

    #[tokio::test]
    async fn test_list_requires_credentials() {
        let result = service_without_keys().list_objects(None).await;
        assert!(matches!(result, Err(ServiceError::Credentials(_))));
    }

    #[tokio::test]
    async fn test_sync_requires_credentials() {
        let result = service_without_keys().run_sync("42", None, None).await;
        assert!(matches!(
            result,
            Err(ServiceError::Sync(SyncError::Configuration(_)))
        ));
    }

    #[tokio::test]
    async fn test_upload_requires_credentials() {
        let result = service_without_keys()
            .upload(b"x".to_vec(), "users/42/x.txt", "text/plain")
            .await;
        assert!(matches!(result, Err(UploadError::Configuration(_))));
    }
}
