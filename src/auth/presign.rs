//! Presigned URL issuance
//!
//! Same SigV4 algorithm as [`super::sigv4::sign`], but the signature travels in
//! the query string so the holder of the URL needs no credentials. Only the
//! `host` header is signed and the payload is `UNSIGNED-PAYLOAD`.

use super::sigv4::{
    amz_date, canonical_query, canonical_request, credential_scope, host_header, signature,
    string_to_sign, HeaderSet, SigningRequest, ALGORITHM, UNSIGNED_PAYLOAD,
};
use super::SigningError;
use crate::s3::credentials::StorageCredentials;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::time::Duration;

/// Longest expiry SigV4 allows (7 days)
pub const MAX_EXPIRY: Duration = Duration::from_secs(604_800);

/// Mint a time-boxed URL for `method` against `url`
///
/// `url` must already carry the encoded object path and no query string.
pub fn presign_url(
    method: &str,
    url: &Url,
    credentials: &StorageCredentials,
    timestamp: DateTime<Utc>,
    expires_in: Duration,
) -> Result<Url, SigningError> {
    if expires_in.is_zero() || expires_in > MAX_EXPIRY {
        return Err(SigningError::InvalidExpiry(format!(
            "{}s is outside 1..={}s",
            expires_in.as_secs(),
            MAX_EXPIRY.as_secs()
        )));
    }

    let host = host_header(url).ok_or_else(|| SigningError::InvalidUrl(url.to_string()))?;
    let region = credentials.region();
    let credential = format!(
        "{}/{}",
        credentials.key_id(),
        credential_scope(timestamp, region)
    );
    let date = amz_date(timestamp);
    let expires = expires_in.as_secs().to_string();

    let query = canonical_query(&[
        ("X-Amz-Algorithm", ALGORITHM),
        ("X-Amz-Credential", &credential),
        ("X-Amz-Date", &date),
        ("X-Amz-Expires", &expires),
        ("X-Amz-SignedHeaders", "host"),
    ]);

    let mut headers = HeaderSet::new();
    headers.insert("host".to_string(), host);

    let canonical = canonical_request(&SigningRequest {
        method,
        path: url.path(),
        query: &query,
        headers: &headers,
        payload_hash: UNSIGNED_PAYLOAD,
    });
    let to_sign = string_to_sign(&canonical, timestamp, region);
    let signature = signature(credentials.app_key(), timestamp, region, &to_sign);

    let mut base = url.clone();
    base.set_query(None);
    let presigned = format!("{}?{}&X-Amz-Signature={}", base, query, signature);

    Url::parse(&presigned).map_err(|e| SigningError::InvalidUrl(e.to_string()))
}
