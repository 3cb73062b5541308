//! Upload orchestrator
//!
//! Resolves credentials, buffers the payload, then tries each strategy of the
//! chain exactly once, in order, stopping at the first success. The default
//! chain is native-http, presigned-url, sdk. The order is static; callers that
//! want an adaptive order can supply their own [`ChainBuilder`].

use super::native::{self, NativeHttpStrategy};
use super::presigned::{self, PresignedUrlStrategy};
use super::sdk::{self, SdkStrategy};
use super::{
    validate_key, AttemptOutcome, UploadError, UploadPayload, UploadResult, UploadStrategy,
};
use crate::config::TransportSettings;
use crate::metrics;
use crate::s3::credentials::{CredentialSource, StorageCredentials};
use std::sync::Arc;
use std::time::Instant;

/// One link of a strategy chain
///
/// A link whose strategy could not be built counts as a failed attempt; the
/// rest of the chain still runs.
pub struct ChainLink {
    pub name: &'static str,
    pub strategy: Result<Box<dyn UploadStrategy>, UploadError>,
}

impl ChainLink {
    /// Link around an already-built strategy
    pub fn ready<S: UploadStrategy + 'static>(strategy: S) -> Self {
        Self {
            name: strategy.name(),
            strategy: Ok(Box::new(strategy)),
        }
    }

    /// Link around a constructor result
    pub fn build<S: UploadStrategy + 'static>(
        name: &'static str,
        built: Result<S, UploadError>,
    ) -> Self {
        Self {
            name,
            strategy: built.map(|s| Box::new(s) as Box<dyn UploadStrategy>),
        }
    }
}

/// Builds the strategy chain for one call from that call's credentials
pub type ChainBuilder = Arc<dyn Fn(&StorageCredentials) -> Vec<ChainLink> + Send + Sync>;

/// The fixed native-http, presigned-url, sdk chain
pub fn default_chain(settings: TransportSettings) -> ChainBuilder {
    Arc::new(move |credentials: &StorageCredentials| {
        vec![
            ChainLink::build(
                native::STRATEGY_NAME,
                NativeHttpStrategy::new(credentials.clone(), &settings),
            ),
            ChainLink::build(
                presigned::STRATEGY_NAME,
                PresignedUrlStrategy::new(credentials.clone(), &settings),
            ),
            ChainLink::build(sdk::STRATEGY_NAME, SdkStrategy::new(credentials, &settings)),
        ]
    })
}

/// Join per-strategy diagnostics into one message
pub fn aggregate_message(outcomes: &[AttemptOutcome]) -> (String, bool) {
    let protocol_incompatible = outcomes.iter().any(|o| o.protocol_incompatible);
    let mut message = outcomes
        .iter()
        .filter(|o| !o.succeeded)
        .map(|o| {
            format!(
                "{}: {}",
                o.strategy,
                o.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("; ");
    if protocol_incompatible {
        message.push_str(" [checksum/header incompatibility detected]");
    }
    (message, protocol_incompatible)
}

/// Upload orchestrator
pub struct UploadOrchestrator {
    source: Arc<dyn CredentialSource>,
    chain: ChainBuilder,
}

impl UploadOrchestrator {
    /// Orchestrator with the default strategy chain
    pub fn new(source: Arc<dyn CredentialSource>, settings: TransportSettings) -> Self {
        Self::with_chain(source, default_chain(settings))
    }

    /// Orchestrator with a custom strategy chain
    pub fn with_chain(source: Arc<dyn CredentialSource>, chain: ChainBuilder) -> Self {
        Self { source, chain }
    }

    /// Upload `payload` to `key`
    ///
    /// Fails only when credentials are invalid, the key is unsafe, the
    /// payload cannot be read, or every strategy failed.
    #[tracing::instrument(
        name = "upload.object",
        skip(self, payload),
        fields(
            s3.key = %key,
            http.content_type = %content_type,
            upload.bytes = tracing::field::Empty,
            upload.strategy = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_object(
        &self,
        payload: impl Into<UploadPayload>,
        key: &str,
        content_type: &str,
    ) -> Result<UploadResult, UploadError> {
        let credentials = match self.source.resolve().require_valid() {
            Ok(credentials) => credentials,
            Err(e) => {
                metrics::record_error("configuration");
                return Err(UploadError::Configuration(e.to_string()));
            }
        };

        if let Err(e) = validate_key(key) {
            metrics::record_error("configuration");
            return Err(e);
        }

        let body = payload.into().into_bytes().await?;
        let bytes = body.len() as u64;
        tracing::Span::current().record("upload.bytes", bytes);

        let chain = (self.chain)(&credentials);
        let mut outcomes = Vec::with_capacity(chain.len());

        for link in chain {
            let name = link.name;
            let strategy = match link.strategy {
                Ok(strategy) => strategy,
                Err(e) => {
                    tracing::warn!(
                        strategy = name,
                        key = %key,
                        error = %e,
                        "Upload strategy unavailable, skipping"
                    );
                    outcomes.push(AttemptOutcome {
                        strategy: name,
                        succeeded: false,
                        protocol_incompatible: false,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };
            let started = Instant::now();
            // Bytes clones share the buffer
            let result = strategy
                .upload(body.clone(), credentials.bucket(), key, content_type)
                .await;
            let elapsed = started.elapsed();
            metrics::record_upload_attempt(name, result.is_ok(), elapsed.as_secs_f64());

            match result {
                Ok(()) => {
                    metrics::record_upload_success(bytes);
                    tracing::Span::current().record("upload.strategy", name);
                    tracing::info!(
                        strategy = name,
                        key = %key,
                        bytes = bytes,
                        duration_ms = elapsed.as_millis(),
                        "Upload completed"
                    );
                    return Ok(UploadResult {
                        storage_key: key.to_string(),
                        storage_url: credentials.object_url(key),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        strategy = name,
                        key = %key,
                        bytes = bytes,
                        duration_ms = elapsed.as_millis(),
                        error = %e,
                        "Upload strategy failed, falling back"
                    );
                    outcomes.push(AttemptOutcome {
                        strategy: name,
                        succeeded: false,
                        protocol_incompatible: e.is_protocol_incompatibility(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let (message, protocol_incompatible) = aggregate_message(&outcomes);
        metrics::record_upload_failure();
        metrics::record_error(if protocol_incompatible {
            "protocol_incompatibility"
        } else {
            "upload"
        });
        tracing::error!(
            key = %key,
            bytes = bytes,
            protocol_incompatible = protocol_incompatible,
            "All upload strategies failed"
        );

        Err(UploadError::AllStrategiesFailed {
            message,
            protocol_incompatible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::credentials::StaticCredentials;
    use crate::upload::MockUploadStrategy;
    use mockall::Sequence;

    fn credentials() -> StorageCredentials {
        StorageCredentials::new("http://127.0.0.1:9000", "media", "key-id", "app-key")
    }

    fn mock(
        name: &'static str,
        outcome: Result<(), &'static str>,
        seq: &mut Sequence,
    ) -> MockUploadStrategy {
        let mut strategy = MockUploadStrategy::new();
        strategy.expect_name().return_const(name);
        strategy
            .expect_upload()
            .times(1)
            .in_sequence(seq)
            .returning(move |_, _, _, _| {
                outcome.map_err(|message| UploadError::Transport {
                    strategy: name.to_string(),
                    message: message.to_string(),
                })
            });
        strategy
    }

    fn orchestrator(strategies: Vec<MockUploadStrategy>) -> UploadOrchestrator {
        let strategies = parking_lot::Mutex::new(Some(strategies));
        let chain: ChainBuilder = Arc::new(move |_: &StorageCredentials| {
            let taken = strategies.lock().take().unwrap_or_default();
            taken.into_iter().map(ChainLink::ready).collect()
        });
        UploadOrchestrator::with_chain(Arc::new(StaticCredentials::new(credentials())), chain)
    }

    #[tokio::test]
    async fn test_falls_back_to_last_strategy() {
        let mut seq = Sequence::new();
        let orchestrator = orchestrator(vec![
            mock("native-http", Err("connection reset"), &mut seq),
            mock("presigned-url", Err("HTTP 503"), &mut seq),
            mock("sdk", Ok(()), &mut seq),
        ]);

        let result = orchestrator
            .upload_object(b"video".to_vec(), "users/42/a.mp4", "video/mp4")
            .await
            .unwrap();
        assert_eq!(result.storage_key, "users/42/a.mp4");
        assert_eq!(result.storage_url, "http://127.0.0.1:9000/media/users/42/a.mp4");
    }

    #[tokio::test]
    async fn test_first_success_skips_rest() {
        let mut seq = Sequence::new();
        let first = mock("native-http", Ok(()), &mut seq);
        let mut second = MockUploadStrategy::new();
        second.expect_name().return_const("presigned-url");
        second.expect_upload().never();

        let orchestrator = orchestrator(vec![first, second]);
        assert!(orchestrator
            .upload_object(b"x".to_vec(), "k", "text/plain")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_credentials_fail_fast() {
        let mut strategy = MockUploadStrategy::new();
        strategy.expect_upload().never();
        let chain_strategies = parking_lot::Mutex::new(Some(vec![strategy]));
        let chain: ChainBuilder = Arc::new(move |_: &StorageCredentials| {
            chain_strategies
                .lock()
                .take()
                .unwrap_or_default()
                .into_iter()
                .map(|s| ChainLink::build("native-http", Ok(s)))
                .collect()
        });
        let creds = StorageCredentials::new("http://127.0.0.1:9000", "media", "", "");
        let orchestrator =
            UploadOrchestrator::with_chain(Arc::new(StaticCredentials::new(creds)), chain);

        let result = orchestrator.upload_object(b"x".to_vec(), "k", "text/plain").await;
        assert!(matches!(result, Err(UploadError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unbuildable_strategy_is_skipped() {
        let mut seq = Sequence::new();
        let fallback = parking_lot::Mutex::new(Some(mock("sdk", Ok(()), &mut seq)));
        let chain: ChainBuilder = Arc::new(move |_: &StorageCredentials| {
            let mut links = vec![ChainLink::build::<MockUploadStrategy>(
                "native-http",
                Err(UploadError::Configuration("bad endpoint".into())),
            )];
            links.extend(fallback.lock().take().map(ChainLink::ready));
            links
        });
        let orchestrator =
            UploadOrchestrator::with_chain(Arc::new(StaticCredentials::new(credentials())), chain);

        let result = orchestrator
            .upload_object(b"x".to_vec(), "users/42/a.mp4", "video/mp4")
            .await
            .unwrap();
        assert_eq!(result.storage_key, "users/42/a.mp4");
    }

    #[tokio::test]
    async fn test_unsafe_key_rejected_before_any_attempt() {
        let mut strategy = MockUploadStrategy::new();
        strategy.expect_name().return_const("native-http");
        strategy.expect_upload().never();
        let orchestrator = orchestrator(vec![strategy]);

        let result = orchestrator
            .upload_object(b"x".to_vec(), "users/42/../a.mp4", "video/mp4")
            .await;
        assert!(matches!(result, Err(UploadError::Configuration(_))));
    }

    #[test]
    fn test_aggregate_message_flags_protocol() {
        let outcomes = vec![
            AttemptOutcome {
                strategy: "native-http",
                succeeded: false,
                error: Some("timed out".into()),
                protocol_incompatible: false,
            },
            AttemptOutcome {
                strategy: "sdk",
                succeeded: false,
                error: Some("Unsupported header x-amz-checksum-crc32".into()),
                protocol_incompatible: true,
            },
        ];
        let (message, flagged) = aggregate_message(&outcomes);
        assert!(flagged);
        assert!(message.contains("native-http: timed out"));
        assert!(message.contains("sdk: Unsupported header"));
        assert!(message.ends_with("[checksum/header incompatibility detected]"));
    }
}
