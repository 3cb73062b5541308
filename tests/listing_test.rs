//! Paginated Listing Integration Tests
//!
//! ## Test Coverage
//!
//! - Continuation tokens are followed until the listing is complete
//! - `max_pages` caps the walk
//! - Prefix and page size reach the wire
//! - Directory markers are not returned as objects

#[cfg(test)]
mod tests {
    use clipvault::config::{ListingSettings, TransportSettings};
    use clipvault::s3::credentials::StorageCredentials;
    use clipvault::s3::S3Client;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(keys: &[&str], next_token: Option<&str>) -> String {
        let contents: String = keys
            .iter()
            .map(|key| {
                format!(
                    "<Contents><Key>{}</Key><Size>1024</Size>\
                     <LastModified>2024-03-01T12:00:00.000Z</LastModified></Contents>",
                    key
                )
            })
            .collect();
        let tail = match next_token {
            Some(token) => format!(
                "<IsTruncated>true</IsTruncated><NextContinuationToken>{}</NextContinuationToken>",
                token
            ),
            None => "<IsTruncated>false</IsTruncated>".to_string(),
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <Name>test-bucket</Name><KeyCount>{}</KeyCount>{}{}</ListBucketResult>",
            keys.len(),
            contents,
            tail
        )
    }

    fn client(server: &MockServer, listing: ListingSettings) -> S3Client {
        let creds =
            StorageCredentials::new(server.uri(), "test-bucket", "test-access", "test-secret");
        S3Client::new(creds, &TransportSettings::default())
            .unwrap()
            .with_listing(listing)
    }

    async fn mount_two_pages(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/test-bucket"))
            .and(query_param("list-type", "2"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                &["users/42/a.mp4", "users/42/b.mp4"],
                Some("token-2"),
            )))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/test-bucket"))
            .and(query_param("continuation-token", "token-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page(&["users/42/c.mp4"], None)),
            )
            .mount(server)
            .await;
    }

    // ========================================================================
    // TEST: Pagination
    // ========================================================================

    #[tokio::test]
    async fn test_follows_continuation_tokens() {
        let mock_server = MockServer::start().await;
        mount_two_pages(&mock_server).await;

        let objects = client(&mock_server, ListingSettings::default())
            .list_objects(None)
            .await
            .unwrap();

        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["users/42/a.mp4", "users/42/b.mp4", "users/42/c.mp4"]);
        assert!(objects.iter().all(|o| o.size == 1024));
        assert!(objects.iter().all(|o| o.last_modified.is_some()));
    }

    #[tokio::test]
    async fn test_max_pages_caps_listing() {
        let mock_server = MockServer::start().await;
        mount_two_pages(&mock_server).await;

        let listing = ListingSettings {
            page_size: 1000,
            max_pages: Some(1),
        };
        let objects = client(&mock_server, listing).list_objects(None).await.unwrap();
        assert_eq!(objects.len(), 2);
    }

    // ========================================================================
    // TEST: Request Shape
    // ========================================================================

    #[tokio::test]
    async fn test_prefix_and_page_size_on_the_wire() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test-bucket"))
            .and(query_param("list-type", "2"))
            .and(query_param("prefix", "users/42/"))
            .and(query_param("max-keys", "250"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page(&["users/42/a.mp4"], None)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let listing = ListingSettings {
            page_size: 250,
            max_pages: None,
        };
        let objects = client(&mock_server, listing)
            .list_objects(Some("users/42/"))
            .await
            .unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_markers_skipped() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test-bucket"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                &["users/42/", "users/42/clips/", "users/42/clips/a.mp4"],
                None,
            )))
            .mount(&mock_server)
            .await;

        let objects = client(&mock_server, ListingSettings::default())
            .list_objects(Some("users/42/"))
            .await
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "users/42/clips/a.mp4");
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>InvalidAccessKeyId</Code><Message>bad key</Message></Error>",
            ))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, ListingSettings::default())
            .list_objects(None)
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("InvalidAccessKeyId"));
    }
}
