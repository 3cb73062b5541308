//! SDK-mediated strategy
//!
//! PutObject through `aws-sdk-s3`, configured for an S3-compatible store:
//! path-style addressing, bounded standard retries, checksums only when an
//! operation requires them, and an interceptor that strips checksum and
//! Content-MD5 headers both before signing and right before transmit.
//! Timeouts and retries are left to the SDK.
//!
//! Certificate verification is always on here: `transport.accept_invalid_certs`
//! relaxes only the reqwest clients of the other two strategies.

use super::{UploadError, UploadStrategy};
use crate::auth::sigv4::is_checksum_header;
use crate::config::TransportSettings;
use crate::s3::credentials::StorageCredentials;
use crate::s3::is_protocol_incompatibility;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::interceptors::BeforeTransmitInterceptorContextMut;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{
    BehaviorVersion, ConfigBag, Intercept, Region, RequestChecksumCalculation,
    ResponseChecksumValidation, RuntimeComponents,
};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_runtime_api::box_error::BoxError;
use aws_smithy_runtime_api::http::{Headers, Response as HttpResponse};
use bytes::Bytes;
use std::time::Duration;

pub const STRATEGY_NAME: &str = "sdk";

/// Remove every checksum-family header, returning how many were dropped
pub fn scrub_headers(headers: &mut Headers) -> usize {
    let doomed: Vec<String> = headers
        .iter()
        .map(|(name, _)| name)
        .filter(|name| is_checksum_header(name))
        .map(str::to_string)
        .collect();
    for name in &doomed {
        headers.remove(name.as_str());
    }
    doomed.len()
}

/// Interceptor that keeps checksum headers off the wire
#[derive(Debug, Default)]
pub struct ChecksumHeaderScrubber;

impl Intercept for ChecksumHeaderScrubber {
    fn name(&self) -> &'static str {
        "ChecksumHeaderScrubber"
    }

    fn modify_before_signing(
        &self,
        context: &mut BeforeTransmitInterceptorContextMut<'_>,
        _runtime_components: &RuntimeComponents,
        _cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let removed = scrub_headers(context.request_mut().headers_mut());
        if removed > 0 {
            tracing::debug!(
                removed = removed,
                stage = "before_signing",
                "Stripped checksum headers"
            );
        }
        Ok(())
    }

    fn modify_before_transmit(
        &self,
        context: &mut BeforeTransmitInterceptorContextMut<'_>,
        _runtime_components: &RuntimeComponents,
        _cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let removed = scrub_headers(context.request_mut().headers_mut());
        if removed > 0 {
            tracing::debug!(
                removed = removed,
                stage = "before_transmit",
                "Stripped checksum headers"
            );
        }
        Ok(())
    }
}

/// PutObject through the vendor SDK
pub struct SdkStrategy {
    client: aws_sdk_s3::Client,
    operation_timeout: Duration,
}

impl SdkStrategy {
    pub fn new(
        credentials: &StorageCredentials,
        settings: &TransportSettings,
    ) -> Result<Self, UploadError> {
        if credentials.endpoint().is_empty() {
            return Err(UploadError::Configuration("endpoint is required".into()));
        }

        if settings.accept_invalid_certs {
            tracing::warn!(
                endpoint = %credentials.endpoint(),
                "accept_invalid_certs does not apply to the sdk strategy; certificates are verified"
            );
        }

        let static_credentials = Credentials::new(
            credentials.key_id(),
            credentials.app_key(),
            None, // session token
            None, // expiration
            "clipvault-env",
        );

        let retry = RetryConfig::standard()
            .with_max_attempts(settings.sdk_max_attempts)
            .with_initial_backoff(settings.sdk_initial_backoff());

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(settings.connect_timeout())
            .read_timeout(settings.read_timeout())
            .operation_timeout(settings.request_timeout())
            .build();

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(credentials.region().to_string()))
            .endpoint_url(credentials.endpoint())
            .credentials_provider(static_credentials)
            .force_path_style(true)
            .retry_config(retry)
            .timeout_config(timeouts)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .interceptor(ChecksumHeaderScrubber)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config),
            operation_timeout: settings.request_timeout(),
        })
    }

    fn map_error<E>(&self, err: SdkError<E, HttpResponse>) -> UploadError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let SdkError::TimeoutError(_) = err {
            return UploadError::Timeout {
                strategy: STRATEGY_NAME.to_string(),
                after: self.operation_timeout,
            };
        }

        let message = DisplayErrorContext(&err).to_string();
        let rejected_headers = err.raw_response().is_some_and(|raw| {
            let status = raw.status().as_u16();
            let body = raw
                .body()
                .bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            is_protocol_incompatibility(status, &body)
                || is_protocol_incompatibility(status, &message)
        });

        if rejected_headers {
            UploadError::ProtocolIncompatibility {
                strategy: STRATEGY_NAME.to_string(),
                message,
            }
        } else {
            UploadError::Transport {
                strategy: STRATEGY_NAME.to_string(),
                message,
            }
        }
    }
}

#[async_trait]
impl UploadStrategy for SdkStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    #[tracing::instrument(
        name = "upload.sdk",
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
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            // Any populated optional field can trip the same rejection
            .set_server_side_encryption(None)
            .set_sse_customer_algorithm(None)
            .set_sse_customer_key(None)
            .set_sse_customer_key_md5(None)
            .set_ssekms_key_id(None)
            .set_ssekms_encryption_context(None)
            .set_bucket_key_enabled(None)
            .set_object_lock_mode(None)
            .set_object_lock_retain_until_date(None)
            .set_object_lock_legal_hold_status(None)
            .set_checksum_algorithm(None)
            .set_checksum_crc32(None)
            .set_checksum_crc32_c(None)
            .set_checksum_sha1(None)
            .set_checksum_sha256(None)
            .set_content_md5(None)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| self.map_error(e))
    }
}
