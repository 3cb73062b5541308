//! Presigned-URL strategy
//!
//! Mints a time-boxed PUT URL and uploads with a vanilla request. Nothing but
//! `Content-Type` is attached, so no client middleware can add headers the
//! store refuses.

use super::{validate_key, with_deadline, UploadError, UploadStrategy};
use crate::auth::presign_url;
use crate::auth::sigv4::uri_encode_path;
use crate::config::TransportSettings;
use crate::s3::credentials::StorageCredentials;
use crate::s3::{build_http_client, is_protocol_incompatibility};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::time::Duration;

pub const STRATEGY_NAME: &str = "presigned-url";

/// Plain PUT against a presigned URL
pub struct PresignedUrlStrategy {
    credentials: StorageCredentials,
    http_client: reqwest::Client,
    expiry: Duration,
    deadline: Duration,
}

impl PresignedUrlStrategy {
    pub fn new(
        credentials: StorageCredentials,
        settings: &TransportSettings,
    ) -> Result<Self, UploadError> {
        let http_client = build_http_client(settings)
            .map_err(|e| UploadError::Configuration(e.to_string()))?;
        Ok(Self {
            credentials,
            http_client,
            expiry: settings.presign_expiry(),
            deadline: settings.request_timeout(),
        })
    }

    /// Presigned PUT URL for `bucket/key`
    pub fn presign_put(&self, bucket: &str, key: &str) -> Result<Url, UploadError> {
        validate_key(key)?;
        let raw = format!(
            "{}/{}/{}",
            self.credentials.endpoint(),
            uri_encode_path(bucket),
            uri_encode_path(key)
        );
        let url = Url::parse(&raw).map_err(|e| UploadError::Configuration(e.to_string()))?;
        presign_url("PUT", &url, &self.credentials, Utc::now(), self.expiry)
            .map_err(|e| UploadError::Configuration(e.to_string()))
    }

    async fn put(&self, url: Url, body: Bytes, content_type: &str) -> Result<(), UploadError> {
        let response = self
            .http_client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Timeout {
                        strategy: STRATEGY_NAME.to_string(),
                        after: self.deadline,
                    }
                } else {
                    UploadError::Transport {
                        strategy: STRATEGY_NAME.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_protocol_incompatibility(status.as_u16(), &body) {
            return Err(UploadError::ProtocolIncompatibility {
                strategy: STRATEGY_NAME.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }
        Err(UploadError::Transport {
            strategy: STRATEGY_NAME.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
        })
    }
}

#[async_trait]
impl UploadStrategy for PresignedUrlStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    #[tracing::instrument(
        name = "upload.presigned_url",
        skip(self, body),
        fields(
            upload.strategy = STRATEGY_NAME,
            s3.bucket = %bucket,
            s3.key = %key,
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
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
        let url = self.presign_put(bucket, key)?;
        with_deadline(STRATEGY_NAME, self.deadline, self.put(url, body, content_type)).await
    }
}
