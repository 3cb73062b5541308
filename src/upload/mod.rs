//! Upload module
//!
//! Three interchangeable PUT transports behind one [`UploadStrategy`] trait,
//! and an [`orchestrator::UploadOrchestrator`] that tries them in order.

use crate::s3::S3ClientError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

pub mod native;
pub mod orchestrator;
pub mod presigned;
pub mod sdk;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{strategy} failed: {message}")]
    Transport { strategy: String, message: String },

    #[error("{strategy} timed out after {after:?}")]
    Timeout { strategy: String, after: Duration },

    #[error("{strategy} rejected by store (checksum/header incompatibility): {message}")]
    ProtocolIncompatibility { strategy: String, message: String },

    #[error("All upload strategies failed: {message}")]
    AllStrategiesFailed {
        message: String,
        protocol_incompatible: bool,
    },

    #[error("Failed to read payload: {0}")]
    Payload(#[from] std::io::Error),
}

impl UploadError {
    /// Map a native client error onto a per-strategy error
    pub fn from_client(strategy: &str, err: S3ClientError, deadline: Duration) -> Self {
        match err {
            S3ClientError::Timeout(_) => Self::Timeout {
                strategy: strategy.to_string(),
                after: deadline,
            },
            S3ClientError::ProtocolIncompatibility { status, message } => {
                Self::ProtocolIncompatibility {
                    strategy: strategy.to_string(),
                    message: format!("HTTP {}: {}", status, message),
                }
            }
            S3ClientError::ConfigError(message) => Self::Configuration(message),
            other => Self::Transport {
                strategy: strategy.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// True for the checksum/header rejection class
    pub fn is_protocol_incompatibility(&self) -> bool {
        match self {
            Self::ProtocolIncompatibility { .. } => true,
            Self::AllStrategiesFailed {
                protocol_incompatible,
                ..
            } => *protocol_incompatible,
            _ => false,
        }
    }
}

/// Upload result
///
/// Both fields are derived from endpoint, bucket and key, never from the
/// store's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub storage_key: String,
    pub storage_url: String,
}

/// Outcome of one strategy attempt within a single upload call
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub strategy: &'static str,
    pub succeeded: bool,
    pub error: Option<String>,
    pub protocol_incompatible: bool,
}

/// Upload body in any of the shapes callers hand us
///
/// Normalized to one [`Bytes`] buffer before the first strategy runs, so every
/// attempt sends the same bytes.
pub enum UploadPayload {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Stream(BoxStream<'static, std::io::Result<Bytes>>),
}

impl UploadPayload {
    /// Wrap an async reader
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Reader(Box::new(reader))
    }

    /// Wrap a stream of byte chunks
    pub fn from_stream(stream: BoxStream<'static, std::io::Result<Bytes>>) -> Self {
        Self::Stream(stream)
    }

    /// Buffer the payload fully
    pub async fn into_bytes(self) -> Result<Bytes, UploadError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            Self::Stream(stream) => {
                let buf = stream
                    .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await?;
                Ok(buf.freeze())
            }
        }
    }
}

impl std::fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for UploadPayload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for UploadPayload {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

/// Reject keys whose signed path would not survive URL normalization
///
/// A key must be non-empty, must not start with `/`, and must not contain
/// empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), UploadError> {
    if key.is_empty() {
        return Err(UploadError::Configuration("object key is empty".into()));
    }
    if key.starts_with('/') {
        return Err(UploadError::Configuration(format!(
            "object key must not start with '/': {}",
            key
        )));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(UploadError::Configuration(format!(
            "object key has an empty or relative segment: {}",
            key
        )));
    }
    Ok(())
}

/// One PUT transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadStrategy: Send + Sync {
    /// Stable name used in logs, metrics and aggregate errors
    fn name(&self) -> &'static str;

    /// Upload `body` to `bucket/key`
    async fn upload(
        &self,
        body: Bytes,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), UploadError>;
}

/// Run `fut` under a cancellation token that fires after `deadline`
///
/// The in-flight request is dropped when the token fires, so a stalled
/// transfer is aborted instead of hanging.
pub(crate) async fn with_deadline<F, T>(
    strategy: &'static str,
    deadline: Duration,
    fut: F,
) -> Result<T, UploadError>
where
    F: Future<Output = Result<T, UploadError>>,
{
    let token = CancellationToken::new();
    let timer = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            token.cancel();
        })
    };

    let result = tokio::select! {
        result = fut => result,
        _ = token.cancelled() => {
            tracing::warn!(strategy = strategy, after = ?deadline, "Upload cancelled at deadline");
            Err(UploadError::Timeout {
                strategy: strategy.to_string(),
                after: deadline,
            })
        }
    };

    timer.abort();
    result
}
