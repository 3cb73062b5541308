//! Clipvault Library
//!
//! Resilient S3-compatible object storage client and storage reconciliation
//! engine for creator media assets (videos, clips, thumbnails, template assets).
//!
//! # Features
//!
//! - **Strategy Chain Uploads**: Native signed PUT, presigned URL PUT and an
//!   SDK-mediated PUT, tried in a fixed order with full error capture
//! - **Hand-rolled SigV4**: Request signing and URL presigning without a vendor SDK
//! - **Header Scrubbing**: Checksum and Content-MD5 headers never reach the store
//! - **Reconciliation**: Diff remote listings against a local index and repair it
//!
//! # Example
//!
//! ```no_run
//! use clipvault::config::Settings;
//! use clipvault::s3::credentials::EnvCredentials;
//! use clipvault::upload::orchestrator::UploadOrchestrator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let orchestrator = UploadOrchestrator::new(Arc::new(EnvCredentials), settings.transport);
//!     let result = orchestrator
//!         .upload_object(b"hello".to_vec(), "users/42/hello.txt", "text/plain")
//!         .await?;
//!     println!("{}", result.storage_url);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod service;
pub mod sync;
pub mod upload;

// Re-export commonly used types
pub use config::Settings;
pub use service::StorageService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
