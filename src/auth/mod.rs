//! Request authentication module
//!
//! Provides AWS Signature Version 4 request signing and URL presigning for
//! S3-compatible object stores, implemented directly on `hmac`/`sha2`.
//!
//! Both entry points are pure: every input (including the timestamp) is passed
//! in, so the same inputs always produce the same output.

use thiserror::Error;

pub mod presign;
pub mod sigv4;

pub use presign::presign_url;
pub use sigv4::{sign, HeaderSet, SigningRequest};

/// Signing errors
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid expiry: {0}")]
    InvalidExpiry(String),
}
