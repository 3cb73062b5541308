//! Native-HTTP strategy
//!
//! Signs the PUT itself and sends it through reqwest. Connect, socket-read and
//! total-request bounds are configured separately, and the whole call runs
//! under a cancellation deadline.

use super::{with_deadline, UploadError, UploadStrategy};
use crate::config::TransportSettings;
use crate::s3::credentials::StorageCredentials;
use crate::s3::S3Client;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub const STRATEGY_NAME: &str = "native-http";

/// Signed PUT over a plain HTTP client
pub struct NativeHttpStrategy {
    client: S3Client,
    deadline: Duration,
}

impl NativeHttpStrategy {
    pub fn new(
        credentials: StorageCredentials,
        settings: &TransportSettings,
    ) -> Result<Self, UploadError> {
        let client = S3Client::new(credentials, settings)
            .map_err(|e| UploadError::Configuration(e.to_string()))?;
        Ok(Self::with_client(client, settings.request_timeout()))
    }

    /// Wrap an existing client
    pub fn with_client(client: S3Client, deadline: Duration) -> Self {
        Self { client, deadline }
    }
}

#[async_trait]
impl UploadStrategy for NativeHttpStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    #[tracing::instrument(
        name = "upload.native_http",
        skip(self, body),
        fields(
            upload.strategy = STRATEGY_NAME,
            s3.bucket = %bucket,
            s3.key = %key,
            upload.bytes = body.len()
        ),
        err
    )]
    async fn upload(
        &self,
        body: Bytes,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), UploadError> {
        if bucket != self.client.bucket() {
            tracing::error!(
                expected_bucket = %self.client.bucket(),
                actual_bucket = %bucket,
                "Bucket mismatch: upload requested for different bucket than client configured"
            );
            return Err(UploadError::Configuration(format!(
                "Bucket mismatch: client configured for '{}' but upload requested for '{}'",
                self.client.bucket(),
                bucket
            )));
        }

        let deadline = self.deadline;
        with_deadline(STRATEGY_NAME, deadline, async {
            self.client
                .put_object(key, body, content_type)
                .await
                .map_err(|e| UploadError::from_client(STRATEGY_NAME, e, deadline))
        })
        .await
    }
}
