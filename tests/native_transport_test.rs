//! Native Transport Integration Tests
//!
//! Exercises the signed native client and the native-http strategy against a
//! wiremock S3 endpoint.
//!
//! ## Test Coverage
//!
//! - Signed PUT lands on the path-style URL with SigV4 headers
//! - No checksum headers are transmitted
//! - Error bodies map to typed errors (generic vs. protocol incompatibility)
//! - Signed DELETE
//! - Keys that would address the bucket or normalize away are refused
//! - Request timeout is reported as a timeout, not a generic failure

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use clipvault::config::TransportSettings;
    use clipvault::s3::credentials::StorageCredentials;
    use clipvault::s3::{S3Client, S3ClientError};
    use clipvault::upload::native::NativeHttpStrategy;
    use clipvault::upload::{UploadError, UploadStrategy};
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, header, method, path};
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

    /// Matches requests whose Authorization header is a SigV4 header for
    /// `key_id` over exactly `signed_headers`
    struct SigV4Authorization {
        key_id: &'static str,
        signed_headers: &'static str,
    }

    impl Match for SigV4Authorization {
        fn matches(&self, request: &Request) -> bool {
            request
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| {
                    v.starts_with(&format!("AWS4-HMAC-SHA256 Credential={}/", self.key_id))
                        && v.contains("/us-east-1/s3/aws4_request, ")
                        && v.contains(&format!("SignedHeaders={}, ", self.signed_headers))
                })
        }
    }

    const PUT_SIGNED_HEADERS: &str = "content-type;host;x-amz-content-sha256;x-amz-date";
    const DELETE_SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

    fn credentials(endpoint: &str) -> StorageCredentials {
        StorageCredentials::new(endpoint, "test-bucket", "test-access", "test-secret")
    }

    fn client(server: &MockServer) -> S3Client {
        S3Client::new(credentials(&server.uri()), &TransportSettings::default()).unwrap()
    }

    // ========================================================================
    // TEST: Signed PUT
    // ========================================================================

    #[tokio::test]
    async fn test_put_object_is_signed_and_path_style() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/test-bucket/users/42/a.mp4"))
            .and(header("content-type", "video/mp4"))
            .and(header("x-amz-content-sha256", "UNSIGNED-PAYLOAD"))
            .and(SigV4Authorization {
                key_id: "test-access",
                signed_headers: PUT_SIGNED_HEADERS,
            })
            .and(NoChecksumHeaders)
            .and(body_bytes(vec![b'v'; 2048]))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        client(&mock_server)
            .put_object("users/42/a.mp4", Bytes::from(vec![b'v'; 2048]), "video/mp4")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_object_encodes_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/test-bucket/users/42/my%20clip%20%281%29.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        client(&mock_server)
            .put_object("users/42/my clip (1).mp4", Bytes::from_static(b"x"), "video/mp4")
            .await
            .unwrap();
    }

    // ========================================================================
    // TEST: Error Mapping
    // ========================================================================

    #[tokio::test]
    async fn test_access_denied_maps_to_response_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>AccessDenied</Code><Message>not entitled</Message></Error>",
            ))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .put_object("a.txt", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap_err();

        match err {
            S3ClientError::ResponseError {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "not entitled");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_header_maps_to_protocol_incompatibility() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                "<Error><Code>InvalidArgument</Code>\
                 <Message>Unsupported header 'x-amz-checksum-crc32' received for this API call.</Message></Error>",
            ))
            .mount(&mock_server)
            .await;

        let strategy =
            NativeHttpStrategy::with_client(client(&mock_server), Duration::from_secs(30));
        let err = strategy
            .upload(Bytes::from_static(b"x"), "test-bucket", "a.txt", "text/plain")
            .await
            .unwrap_err();

        assert!(err.is_protocol_incompatibility());
        assert!(matches!(
            err,
            UploadError::ProtocolIncompatibility { ref strategy, .. } if strategy == "native-http"
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string("<Error><Code>SlowDown</Code></Error>"),
            )
            .mount(&mock_server)
            .await;

        let strategy =
            NativeHttpStrategy::with_client(client(&mock_server), Duration::from_secs(30));
        let err = strategy
            .upload(Bytes::from_static(b"x"), "test-bucket", "a.txt", "text/plain")
            .await
            .unwrap_err();

        assert!(!err.is_protocol_incompatibility());
        assert!(err.to_string().contains("SlowDown"));
    }

    // ========================================================================
    // TEST: Timeouts
    // ========================================================================

    #[tokio::test]
    async fn test_stalled_upload_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let settings = TransportSettings {
            connect_timeout_secs: 1,
            request_timeout_secs: 1,
            ..TransportSettings::default()
        };
        let strategy = NativeHttpStrategy::new(credentials(&mock_server.uri()), &settings).unwrap();
        let err = strategy
            .upload(Bytes::from_static(b"x"), "test-bucket", "a.txt", "text/plain")
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Timeout { .. }), "got {:?}", err);
    }

    // ========================================================================
    // TEST: Signed DELETE
    // ========================================================================

    #[tokio::test]
    async fn test_delete_object() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/test-bucket/users/42/stray.mp4"))
            .and(SigV4Authorization {
                key_id: "test-access",
                signed_headers: DELETE_SIGNED_HEADERS,
            })
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        client(&mock_server)
            .delete_object("users/42/stray.mp4")
            .await
            .unwrap();
    }

    // ========================================================================
    // TEST: Unsafe Keys
    // ========================================================================

    #[tokio::test]
    async fn test_unsafe_keys_never_reach_store() {
        let mock_server = MockServer::start().await;

        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client(&mock_server);
        for key in ["", "/", "users/42/../other.mp4", "users/./a.mp4"] {
            let put = client
                .put_object(key, Bytes::from_static(b"x"), "text/plain")
                .await;
            assert!(matches!(put, Err(S3ClientError::ConfigError(_))), "put {:?}", key);

            let delete = client.delete_object(key).await;
            assert!(matches!(delete, Err(S3ClientError::ConfigError(_))), "delete {:?}", key);
        }
    }
}
