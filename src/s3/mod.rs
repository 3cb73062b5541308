//! S3 Client module
//!
//! Provides a native-HTTP S3 client with hand-rolled SigV4 signing.
//!
//! # Features
//!
//! - **Path-style addressing**: `<endpoint>/<bucket>/<key>`
//! - **Unsigned payloads**: bodies are never hashed (`UNSIGNED-PAYLOAD`)
//! - **Layered timeouts**: connect, socket read and total request bounds are set independently
//! - **Paginated listing**: `ListObjectsV2` continuation tokens are followed to the end
//!
//! # Example
//!
//! ```no_run
//! use clipvault::config::TransportSettings;
//! use clipvault::s3::credentials::StorageCredentials;
//! use clipvault::s3::S3Client;
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let creds = StorageCredentials::new(
//!     "s3.us-west-004.backblazeb2.com",
//!     "media",
//!     "key-id",
//!     "app-key",
//! );
//! let client = S3Client::new(creds, &TransportSettings::default())?;
//!
//! client.put_object("users/42/intro.mp4", Bytes::from("..."), "video/mp4").await?;
//! let objects = client.list_objects(Some("users/42/")).await?;
//! println!("{} objects", objects.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | PutObject | `s3.put_object` | bucket, key, method, bytes, status_code |
//! | DeleteObject | `s3.delete_object` | bucket, key, method, status_code |
//! | ListObjectsV2 | `s3.list_objects_page` | bucket, prefix, method, keys, status_code |

pub mod credentials;

use crate::auth::sigv4::{
    self, amz_date, canonical_query, host_header, uri_encode_path, SigningRequest,
    HEADER_CONTENT_SHA256, HEADER_DATE, UNSIGNED_PAYLOAD,
};
use crate::config::{ListingSettings, TransportSettings};
use crate::metrics;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use credentials::StorageCredentials;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("S3 returned {status}: {code}: {message}")]
    ResponseError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Store rejected request headers ({status}): {message}")]
    ProtocolIncompatibility { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Signing error: {0}")]
    SigningError(#[from] crate::auth::SigningError),
}

impl S3ClientError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::RequestError(format!("connection failed: {}", err))
        } else {
            Self::RequestError(err.to_string())
        }
    }
}

/// One object in the remote store, as seen at listing time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Wire shape of `ListBucketResult`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListContents>,
    #[serde(default)]
    is_truncated: Option<bool>,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListContents {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    last_modified: Option<String>,
}

/// Wire shape of an S3 `<Error>` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Parse a ListObjectsV2 XML body
pub fn parse_list_response(xml: &str) -> Result<ListPage, S3ClientError> {
    let result: ListBucketResult =
        quick_xml::de::from_str(xml).map_err(|e| S3ClientError::ParseError(e.to_string()))?;

    let objects = result
        .contents
        .into_iter()
        // Directory markers are not assets
        .filter(|c| !c.key.ends_with('/'))
        .map(|c| RemoteObject {
            last_modified: c
                .last_modified
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            key: c.key,
            size: c.size,
        })
        .collect();

    Ok(ListPage {
        objects,
        is_truncated: result.is_truncated.unwrap_or(false),
        next_continuation_token: result.next_continuation_token.filter(|t| !t.is_empty()),
    })
}

/// True when a rejection is caused by checksum / Content-MD5 / unknown headers
pub fn is_protocol_incompatibility(status: u16, body: &str) -> bool {
    if !(400..500).contains(&status) {
        return false;
    }
    let body = body.to_ascii_lowercase();
    ["checksum", "content-md5", "unsupported header", "not supported header"]
        .iter()
        .any(|needle| body.contains(needle))
}

/// Build the reqwest client used by the native and presigned transports
///
/// The TLS relaxation applies to this client only.
pub fn build_http_client(settings: &TransportSettings) -> Result<reqwest::Client, S3ClientError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout())
        .read_timeout(settings.read_timeout())
        .timeout(settings.request_timeout())
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .build()
        .map_err(|e| S3ClientError::ConfigError(e.to_string()))
}

/// S3 Client
pub struct S3Client {
    credentials: StorageCredentials,
    listing: ListingSettings,
    http_client: reqwest::Client,
}

impl S3Client {
    /// Create a new S3 client
    pub fn new(
        credentials: StorageCredentials,
        settings: &TransportSettings,
    ) -> Result<Self, S3ClientError> {
        if credentials.endpoint().is_empty() || credentials.bucket().is_empty() {
            return Err(S3ClientError::ConfigError(
                "endpoint and bucket are required".into(),
            ));
        }
        Url::parse(credentials.endpoint())
            .map_err(|e| S3ClientError::ConfigError(format!("invalid endpoint: {}", e)))?;

        Ok(Self {
            credentials,
            listing: ListingSettings::default(),
            http_client: build_http_client(settings)?,
        })
    }

    /// Use custom listing settings
    pub fn with_listing(mut self, listing: ListingSettings) -> Self {
        self.listing = listing;
        self
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        self.credentials.bucket()
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        self.credentials.endpoint()
    }

    /// Get the signing region
    pub fn region(&self) -> &str {
        self.credentials.region()
    }

    /// Public URL of an object
    pub fn object_url(&self, key: &str) -> String {
        self.credentials.object_url(key)
    }

    /// Encoded path of an object, `/<bucket>/<key>`
    ///
    /// Refuses keys that would address the bucket itself or that URL
    /// normalization would rewrite into another key.
    fn object_path(&self, key: &str) -> Result<String, S3ClientError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|s| s == "." || s == "..") {
            return Err(S3ClientError::ConfigError(format!(
                "unsafe object key: {:?}",
                key
            )));
        }
        Ok(format!(
            "/{}/{}",
            uri_encode_path(self.bucket()),
            uri_encode_path(key)
        ))
    }

    /// Sign and send one request
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        query: &str,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, S3ClientError> {
        let mut url = format!("{}{}", self.endpoint(), path);
        if !query.is_empty() {
            url = format!("{}?{}", url, query);
        }
        let url = Url::parse(&url).map_err(|e| S3ClientError::ConfigError(e.to_string()))?;
        let host = host_header(&url)
            .ok_or_else(|| crate::auth::SigningError::InvalidUrl(url.to_string()))?;

        let now = Utc::now();
        let date = amz_date(now);
        let mut header_pairs = vec![
            ("host", host.as_str()),
            (HEADER_CONTENT_SHA256, UNSIGNED_PAYLOAD),
            (HEADER_DATE, date.as_str()),
        ];
        if let Some(content_type) = content_type {
            header_pairs.push((CONTENT_TYPE.as_str(), content_type));
        }
        let headers = sigv4::signable_headers(header_pairs);

        let authorization = sigv4::sign(
            &SigningRequest {
                method: method.as_str(),
                path,
                query,
                headers: &headers,
                payload_hash: UNSIGNED_PAYLOAD,
            },
            &self.credentials,
            now,
        );

        let mut request = self.http_client.request(method, url);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        request = request.header(AUTHORIZATION, authorization);
        if let Some(body) = body {
            request = request.body(body);
        }

        request.send().await.map_err(S3ClientError::from_reqwest)
    }

    /// Turn a non-2xx response into a typed error
    async fn error_from_response(response: reqwest::Response) -> S3ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if is_protocol_incompatibility(status, &body) {
            return S3ClientError::ProtocolIncompatibility {
                status,
                message: body.trim().to_string(),
            };
        }

        let parsed: ErrorBody = quick_xml::de::from_str(&body).unwrap_or_default();
        S3ClientError::ResponseError {
            status,
            code: if parsed.code.is_empty() {
                StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown")
                    .to_string()
            } else {
                parsed.code
            },
            message: parsed.message,
        }
    }

    /// Upload an object with a signed PUT
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body),
        fields(
            s3.bucket = %self.bucket(),
            s3.key = %key,
            http.method = "PUT",
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), S3ClientError> {
        let bytes = body.len();
        let path = self.object_path(key)?;
        let response = self
            .send_signed(Method::PUT, &path, "", Some(content_type), Some(body))
            .await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }

        tracing::debug!(bytes = bytes, "PutObject completed");
        Ok(())
    }

    /// Delete an object
    #[tracing::instrument(
        name = "s3.delete_object",
        skip(self),
        fields(
            s3.bucket = %self.bucket(),
            s3.key = %key,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn delete_object(&self, key: &str) -> Result<(), S3ClientError> {
        let path = self.object_path(key)?;
        let response = self
            .send_signed(Method::DELETE, &path, "", None, None)
            .await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        // Deleting a missing key is not an error on S3
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    /// Fetch a single ListObjectsV2 page
    #[tracing::instrument(
        name = "s3.list_objects_page",
        skip(self, continuation_token),
        fields(
            s3.bucket = %self.bucket(),
            s3.prefix = ?prefix,
            http.method = "GET",
            s3.keys = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn list_objects_page(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: u32,
    ) -> Result<ListPage, S3ClientError> {
        let max_keys = max_keys.to_string();
        let mut params = vec![("list-type", "2"), ("max-keys", max_keys.as_str())];
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            params.push(("prefix", prefix));
        }
        if let Some(token) = continuation_token {
            params.push(("continuation-token", token));
        }
        let query = canonical_query(&params);
        let path = format!("/{}", uri_encode_path(self.bucket()));

        let result = self.send_signed(Method::GET, &path, &query, None, None).await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_list_request(false);
                return Err(e);
            }
        };

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        if !status.is_success() {
            metrics::record_list_request(false);
            return Err(Self::error_from_response(response).await);
        }

        let body = response.text().await.map_err(S3ClientError::from_reqwest)?;
        let page = parse_list_response(&body)?;
        metrics::record_list_request(true);
        tracing::Span::current().record("s3.keys", page.objects.len());
        Ok(page)
    }

    /// List every object under `prefix`, following continuation tokens
    ///
    /// Stops early only when `listing.max_pages` is set and reached.
    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<RemoteObject>, S3ClientError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .list_objects_page(prefix, token.as_deref(), self.listing.page_size)
                .await?;
            pages += 1;
            objects.extend(page.objects);

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(next)) => {
                    if self.listing.max_pages.is_some_and(|max| pages >= max) {
                        tracing::warn!(
                            pages = pages,
                            objects = objects.len(),
                            prefix = ?prefix,
                            "Listing stopped at max_pages; results are truncated"
                        );
                        break;
                    }
                    token = Some(next);
                }
                (true, None) => {
                    tracing::warn!(
                        prefix = ?prefix,
                        "Listing reported truncation without a continuation token"
                    );
                    break;
                }
                _ => break,
            }
        }

        tracing::debug!(pages = pages, objects = objects.len(), "Listing completed");
        Ok(objects)
    }
}
