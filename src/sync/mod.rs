//! Storage reconciliation
//!
//! Keeps the local index consistent with what the remote store actually
//! holds. Neither side is trusted to match the other: every run lists the
//! remote prefix, reads the local records, and diffs them key by key.
//!
//! A run moves through `initializing -> listing -> syncing -> completed`,
//! or ends in `error` when listing or the initial index read fails.
//! Per-item failures never end a run; they are collected in
//! [`SyncProgress::errors`].

use crate::s3::{RemoteObject, S3ClientError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod engine;
pub mod index;

pub use engine::{RemoteStore, SyncEngine};
pub use index::{InMemoryIndex, IndexError, JsonFileIndex, LocalIndex, LocalRecord, NewRecord};

/// Sync errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote listing failed: {0}")]
    Listing(#[from] S3ClientError),

    #[error("Local index error: {0}")]
    Index(#[from] IndexError),
}

/// Run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Initializing,
    Listing,
    Syncing,
    Completed,
    Error,
}

impl SyncPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// What a per-item action was trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Create a local record for a remote object
    Add,
    /// Delete a local record whose object is gone
    Remove,
    /// Delete a remote object nobody indexes
    DeleteRemote,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::DeleteRemote => "delete_remote",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed per-item action
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{action} {key}: {message}")]
pub struct SyncItemError {
    pub key: String,
    pub action: SyncAction,
    pub message: String,
}

/// Running state of one reconciliation, streamed to the progress callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub current_file: Option<String>,
    pub processed_files: usize,
    pub total_files: usize,
    pub added_to_database: usize,
    pub removed_from_database: usize,
    #[serde(rename = "removedFromB2")]
    pub removed_from_remote: usize,
    pub errors: Vec<SyncItemError>,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Initializing,
            current_file: None,
            processed_files: 0,
            total_files: 0,
            added_to_database: 0,
            removed_from_database: 0,
            removed_from_remote: 0,
            errors: Vec::new(),
        }
    }
}

/// Receives every progress update
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, progress: &SyncProgress);
}

impl<F> ProgressCallback for F
where
    F: Fn(&SyncProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &SyncProgress) {
        self(progress)
    }
}

/// Which diff actions a run applies
#[derive(Clone)]
pub struct SyncOptions {
    pub add_missing: bool,
    pub remove_orphaned: bool,
    /// Delete remote objects with no local record. Ignored when
    /// `add_missing` is set, since those objects get indexed instead.
    pub cleanup_orphans: bool,
    pub dry_run: bool,
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl SyncOptions {
    pub fn with_progress(mut self, callback: impl ProgressCallback + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            add_missing: true,
            remove_orphaned: true,
            cleanup_orphans: false,
            dry_run: false,
            progress: None,
        }
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("add_missing", &self.add_missing)
            .field("remove_orphaned", &self.remove_orphaned)
            .field("cleanup_orphans", &self.cleanup_orphans)
            .field("dry_run", &self.dry_run)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Classifier outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Counts are close; an incremental diff is enough
    Fast,
    /// Index must be rebuilt from remote truth
    Full,
    /// Index references objects that no longer exist
    Repair,
}

impl SyncStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Full => "full",
            Self::Repair => "repair",
        }
    }

    /// Apply options for this strategy
    pub fn default_options(self) -> SyncOptions {
        match self {
            Self::Fast | Self::Full => SyncOptions::default(),
            Self::Repair => SyncOptions {
                add_missing: false,
                ..SyncOptions::default()
            },
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "full" => Ok(Self::Full),
            "repair" => Ok(Self::Repair),
            other => Err(format!("unknown sync strategy: {}", other)),
        }
    }
}

/// Classifier decision for one owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartSyncResult {
    pub strategy: SyncStrategy,
    pub remote_objects: Vec<RemoteObject>,
    pub local_count: usize,
    pub recommendation: String,
}

/// Keys a run would touch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
    pub to_delete_remote: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_delete_remote.is_empty()
    }
}
