//! SDK Transport Integration Tests
//!
//! Drives the SDK-mediated strategy against a wiremock S3 endpoint.
//!
//! ## Test Coverage
//!
//! - PutObject lands on the path-style URL with the original bytes
//! - No checksum-family header reaches the wire
//! - Header rejections are classified as protocol incompatibility
//! - Server errors are retried up to the configured attempt count

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use clipvault::config::TransportSettings;
    use clipvault::s3::credentials::StorageCredentials;
    use clipvault::upload::sdk::SdkStrategy;
    use clipvault::upload::{UploadError, UploadStrategy};
    use wiremock::matchers::{body_bytes, header, header_exists, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    /// Matches requests carrying no checksum-family header
    struct NoChecksumHeaders;

    impl Match for NoChecksumHeaders {
        fn matches(&self, request: &Request) -> bool {
            !request.headers.keys().any(|name| {
                let name = name.as_str();
                name.starts_with("x-amz-checksum-")
                    || name == "x-amz-sdk-checksum-algorithm"
                    || name == "content-md5"
            })
        }
    }

    fn strategy(server: &MockServer, settings: TransportSettings) -> SdkStrategy {
        let creds = StorageCredentials::new(server.uri(), "media", "test-access", "test-secret");
        SdkStrategy::new(&creds, &settings).unwrap()
    }

    fn single_attempt() -> TransportSettings {
        TransportSettings {
            sdk_max_attempts: 1,
            sdk_initial_backoff_ms: 10,
            ..TransportSettings::default()
        }
    }

    // ========================================================================
    // TEST: PutObject
    // ========================================================================

    #[tokio::test]
    async fn test_put_object_is_path_style_without_checksums() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/media/users/42/clip.mp4"))
            .and(header("content-type", "video/mp4"))
            .and(header_exists("authorization"))
            .and(NoChecksumHeaders)
            .and(body_bytes(b"video-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        strategy(&mock_server, single_attempt())
            .upload(
                Bytes::from_static(b"video-bytes"),
                "media",
                "users/42/clip.mp4",
                "video/mp4",
            )
            .await
            .unwrap();
    }

    // ========================================================================
    // TEST: Failures
    // ========================================================================

    #[tokio::test]
    async fn test_header_rejection_is_protocol_incompatibility() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                "<Error><Code>InvalidArgument</Code>\
                 <Message>Unsupported header 'x-amz-checksum-crc32' received for this API call.</Message></Error>",
            ))
            .mount(&mock_server)
            .await;

        let err = strategy(&mock_server, single_attempt())
            .upload(Bytes::from_static(b"x"), "media", "a.txt", "text/plain")
            .await
            .unwrap_err();

        match err {
            UploadError::ProtocolIncompatibility { strategy, .. } => assert_eq!(strategy, "sdk"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/media/a.txt"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                "<Error><Code>InternalError</Code><Message>try again</Message></Error>",
            ))
            .expect(2)
            .mount(&mock_server)
            .await;

        let settings = TransportSettings {
            sdk_max_attempts: 2,
            ..single_attempt()
        };
        let err = strategy(&mock_server, settings)
            .upload(Bytes::from_static(b"x"), "media", "a.txt", "text/plain")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transport { ref strategy, .. } if strategy == "sdk"));
    }
}
