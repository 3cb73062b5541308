//! AWS SigV4 request signing
//!
//! Produces the `Authorization` header value for a single HTTP request.
//!
//! ```text
//! canonical request  = METHOD \n URI \n QUERY \n HEADERS \n SIGNED-NAMES \n PAYLOAD-HASH
//! string to sign     = AWS4-HMAC-SHA256 \n TIMESTAMP \n SCOPE \n hex(sha256(canonical request))
//! signing key        = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
//! signature          = hex(HMAC(signing key, string to sign))
//! ```
//!
//! Checksum headers (`x-amz-checksum-*`, `x-amz-sdk-checksum-algorithm`,
//! `content-md5`) are never signed; the target store rejects requests that
//! carry them.

use crate::s3::credentials::StorageCredentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
/// Payload hash marker; bodies are never hashed
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
/// Service name in the credential scope
pub const SERVICE: &str = "s3";
/// Scope terminator
pub const SCOPE_TERMINATOR: &str = "aws4_request";

pub const HEADER_DATE: &str = "x-amz-date";
pub const HEADER_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// RFC 3986 unreserved characters stay literal, everything else is escaped
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Lower-cased header name -> trimmed value, iterated in sorted order
pub type HeaderSet = BTreeMap<String, String>;

/// The parts of one HTTP request that take part in signing
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// Canonical (already encoded) URI path
    pub path: &'a str,
    /// Canonical query string, empty for PUT/DELETE
    pub query: &'a str,
    pub headers: &'a HeaderSet,
    pub payload_hash: &'a str,
}

/// True for the checksum header family the store refuses
pub fn is_checksum_header(name: &str) -> bool {
    let name = name.trim().to_ascii_lowercase();
    name.starts_with("x-amz-checksum-")
        || name == "x-amz-sdk-checksum-algorithm"
        || name == "content-md5"
}

/// Normalize headers for signing: lower-case names, trim values, drop checksum headers
pub fn signable_headers<'a, I>(headers: I) -> HeaderSet
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .filter(|(name, _)| !is_checksum_header(name))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

/// Percent-encode one string per SigV4 rules
pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, URI_ENCODE_SET).to_string()
}

/// Percent-encode an object key, keeping `/` separators
pub fn uri_encode_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Canonical query string from unencoded pairs, sorted by encoded name then value
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// `yyyymmddThhmmssZ`
pub fn amz_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `yyyymmdd`
pub fn date_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

/// `<date>/<region>/s3/aws4_request`
pub fn credential_scope(timestamp: DateTime<Utc>, region: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        date_stamp(timestamp),
        region,
        SERVICE,
        SCOPE_TERMINATOR
    )
}

/// Semicolon-joined signed header names
pub fn signed_header_names(headers: &HeaderSet) -> String {
    headers
        .keys()
        .filter(|name| !is_checksum_header(name))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";")
}

/// Build the canonical request text
pub fn canonical_request(request: &SigningRequest<'_>) -> String {
    let canonical_headers: String = request
        .headers
        .iter()
        .filter(|(name, _)| !is_checksum_header(name))
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        canonical_headers,
        signed_header_names(request.headers),
        request.payload_hash
    )
}

/// Build the string to sign for a canonical request
pub fn string_to_sign(canonical_request: &str, timestamp: DateTime<Utc>, region: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date(timestamp),
        credential_scope(timestamp, region),
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Derive the per-day signing key
pub fn signing_key(secret: &str, timestamp: DateTime<Utc>, region: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{}", secret);
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp(timestamp).as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes())
}

/// Hex signature of a string to sign
pub fn signature(
    secret: &str,
    timestamp: DateTime<Utc>,
    region: &str,
    string_to_sign: &str,
) -> String {
    let key = signing_key(secret, timestamp, region);
    hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()))
}

/// Sign a request and return the `Authorization` header value
///
/// Deterministic: depends only on its arguments.
pub fn sign(
    request: &SigningRequest<'_>,
    credentials: &StorageCredentials,
    timestamp: DateTime<Utc>,
) -> String {
    let region = credentials.region();
    let canonical = canonical_request(request);
    let to_sign = string_to_sign(&canonical, timestamp, region);
    let signature = signature(credentials.app_key(), timestamp, region, &to_sign);

    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        credentials.key_id(),
        credential_scope(timestamp, region),
        signed_header_names(request.headers),
        signature
    )
}

/// Host header value for a URL (port kept only when non-default)
pub fn host_header(url: &reqwest::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
