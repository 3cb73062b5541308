//! Reconciliation engine
//!
//! [`SyncEngine::smart_sync`] picks a strategy from counts alone.
//! [`SyncEngine::sync_with_progress`] always does the real key-level diff, so
//! a misclassified `fast` run still converges.

use super::index::{LocalIndex, LocalRecord, NewRecord};
use super::{
    SmartSyncResult, SyncAction, SyncError, SyncItemError, SyncOptions, SyncPhase, SyncPlan,
    SyncProgress, SyncStrategy,
};
use crate::config::SyncSettings;
use crate::metrics;
use crate::s3::{RemoteObject, S3Client, S3ClientError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// The remote side of a reconciliation
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every object under `prefix`
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, S3ClientError>;

    async fn delete_object(&self, key: &str) -> Result<(), S3ClientError>;

    fn object_url(&self, key: &str) -> String;
}

#[async_trait]
impl RemoteStore for S3Client {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, S3ClientError> {
        S3Client::list_objects(self, Some(prefix)).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), S3ClientError> {
        S3Client::delete_object(self, key).await
    }

    fn object_url(&self, key: &str) -> String {
        S3Client::object_url(self, key)
    }
}

/// Count-only classification
///
/// Equal numbers of additions and removals cancel out and classify as
/// `fast`; the apply phase diffs keys regardless.
pub fn classify(
    local_count: usize,
    remote_count: usize,
    drift_threshold: usize,
) -> (SyncStrategy, String) {
    if local_count == 0 && remote_count > 0 {
        (
            SyncStrategy::Full,
            format!(
                "Local index is empty but {} objects exist remotely; rebuild the index from the store",
                remote_count
            ),
        )
    } else if local_count > 0 && remote_count == 0 {
        (
            SyncStrategy::Repair,
            format!(
                "Local index has {} records but the store has no objects; remove stale records",
                local_count
            ),
        )
    } else if local_count.abs_diff(remote_count) > drift_threshold {
        (
            SyncStrategy::Full,
            format!(
                "Local ({}) and remote ({}) counts differ by more than {}; run a full sync",
                local_count, remote_count, drift_threshold
            ),
        )
    } else {
        (
            SyncStrategy::Fast,
            format!(
                "Local ({}) and remote ({}) counts are within {}; an incremental sync is enough",
                local_count, remote_count, drift_threshold
            ),
        )
    }
}

/// Asset title from an object key: file name without its extension
pub fn title_from_key(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or_default();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file_name,
    };
    if stem.trim().is_empty() {
        "Untitled".to_string()
    } else {
        stem.to_string()
    }
}

/// Key-level diff between remote objects and local records
pub fn diff(remote: &[RemoteObject], local: &[LocalRecord], options: &SyncOptions) -> SyncPlan {
    let local_keys: HashSet<&str> = local.iter().map(|r| r.key.as_str()).collect();
    let remote_keys: HashSet<&str> = remote.iter().map(|o| o.key.as_str()).collect();

    let mut plan = SyncPlan::default();
    let mut seen = HashSet::new();
    for object in remote {
        if local_keys.contains(object.key.as_str()) || !seen.insert(object.key.as_str()) {
            continue;
        }
        if options.add_missing {
            plan.to_add.push(object.key.clone());
        } else if options.cleanup_orphans {
            plan.to_delete_remote.push(object.key.clone());
        }
    }

    if options.remove_orphaned {
        plan.to_remove = local
            .iter()
            .filter(|r| !remote_keys.contains(r.key.as_str()))
            .map(|r| r.key.clone())
            .collect();
    }

    plan
}

/// Reconciliation engine
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    index: Arc<dyn LocalIndex>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        index: Arc<dyn LocalIndex>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            index,
            settings,
        }
    }

    fn emit(options: &SyncOptions, progress: &SyncProgress) {
        if let Some(callback) = &options.progress {
            callback.on_progress(progress);
        }
    }

    fn fail<E>(options: &SyncOptions, progress: &mut SyncProgress, err: E) -> SyncError
    where
        E: Into<SyncError>,
    {
        let err = err.into();
        progress.phase = SyncPhase::Error;
        progress.current_file = None;
        Self::emit(options, progress);
        metrics::record_sync_run("apply", false);
        tracing::error!(error = %err, "Sync aborted");
        err
    }

    /// Classify how far the local index has drifted for `owner_id`
    #[tracing::instrument(
        name = "sync.smart_sync",
        skip(self),
        fields(sync.strategy = tracing::field::Empty),
        err
    )]
    pub async fn smart_sync(
        &self,
        owner_id: &str,
        local_count: usize,
    ) -> Result<SmartSyncResult, SyncError> {
        let prefix = self.settings.owner_prefix_for(owner_id);
        let remote_objects = self.store.list_objects(&prefix).await?;
        let (strategy, recommendation) =
            classify(local_count, remote_objects.len(), self.settings.drift_threshold);

        tracing::Span::current().record("sync.strategy", strategy.as_str());
        tracing::info!(
            owner_id = %owner_id,
            local_count = local_count,
            remote_count = remote_objects.len(),
            strategy = %strategy,
            "Sync strategy classified"
        );

        Ok(SmartSyncResult {
            strategy,
            remote_objects,
            local_count,
            recommendation,
        })
    }

    /// Compute what a run with `options` would change, without changing anything
    pub async fn plan(&self, owner_id: &str, options: &SyncOptions) -> Result<SyncPlan, SyncError> {
        let prefix = self.settings.owner_prefix_for(owner_id);
        let remote = self.store.list_objects(&prefix).await?;
        let local = self.index.list_by_owner(owner_id).await?;
        Ok(diff(&remote, &local, options))
    }

    /// Diff and apply for `owner_id`
    ///
    /// Returns `Err` only when listing or the initial index read fails.
    /// Per-item failures land in the returned progress' `errors`.
    #[tracing::instrument(
        name = "sync.apply",
        skip(self, options),
        fields(sync.dry_run = options.dry_run, sync.total = tracing::field::Empty),
        err
    )]
    pub async fn sync_with_progress(
        &self,
        owner_id: &str,
        options: SyncOptions,
    ) -> Result<SyncProgress, SyncError> {
        let mut progress = SyncProgress::default();
        Self::emit(&options, &progress);

        progress.phase = SyncPhase::Listing;
        Self::emit(&options, &progress);

        let prefix = self.settings.owner_prefix_for(owner_id);
        let remote = match self.store.list_objects(&prefix).await {
            Ok(remote) => remote,
            Err(e) => return Err(Self::fail(&options, &mut progress, e)),
        };
        progress.total_files = remote.len();
        tracing::Span::current().record("sync.total", remote.len());

        let local = match self.index.list_by_owner(owner_id).await {
            Ok(local) => local,
            Err(e) => return Err(Self::fail(&options, &mut progress, e)),
        };

        progress.phase = SyncPhase::Syncing;
        Self::emit(&options, &progress);

        let plan = diff(&remote, &local, &options);

        if options.dry_run {
            tracing::info!(
                owner_id = %owner_id,
                to_add = ?plan.to_add,
                to_remove = ?plan.to_remove,
                to_delete_remote = ?plan.to_delete_remote,
                "Dry run: no changes applied"
            );
            progress.processed_files = remote.len();
            progress.phase = SyncPhase::Completed;
            Self::emit(&options, &progress);
            metrics::record_sync_run("apply", true);
            return Ok(progress);
        }

        // Taken on first use so a key listed twice is acted on once
        let mut to_add: HashSet<&str> = plan.to_add.iter().map(String::as_str).collect();
        let mut to_delete: HashSet<&str> =
            plan.to_delete_remote.iter().map(String::as_str).collect();
        let to_remove: HashSet<&str> = plan.to_remove.iter().map(String::as_str).collect();

        for object in &remote {
            progress.current_file = Some(object.key.clone());

            if to_add.remove(object.key.as_str()) {
                self.add_record(owner_id, object, &mut progress).await;
            } else if to_delete.remove(object.key.as_str()) {
                self.delete_remote(&object.key, &mut progress).await;
            }

            progress.processed_files += 1;
            Self::emit(&options, &progress);
        }

        for record in local.iter().filter(|r| to_remove.contains(r.key.as_str())) {
            progress.current_file = Some(record.key.clone());
            self.remove_record(record, &mut progress).await;
            Self::emit(&options, &progress);
        }

        progress.current_file = None;
        progress.phase = SyncPhase::Completed;
        Self::emit(&options, &progress);
        metrics::record_sync_run("apply", true);

        tracing::info!(
            owner_id = %owner_id,
            total = progress.total_files,
            added = progress.added_to_database,
            removed = progress.removed_from_database,
            removed_remote = progress.removed_from_remote,
            errors = progress.errors.len(),
            "Sync completed"
        );

        Ok(progress)
    }

    async fn add_record(&self, owner_id: &str, object: &RemoteObject, progress: &mut SyncProgress) {
        let record = NewRecord {
            owner_id: owner_id.to_string(),
            key: object.key.clone(),
            title: title_from_key(&object.key),
            url: self.store.object_url(&object.key),
            size: object.size,
            uploaded_at: object.last_modified.unwrap_or_else(Utc::now),
        };
        match self.index.create(record).await {
            Ok(_) => {
                progress.added_to_database += 1;
                metrics::record_sync_item(SyncAction::Add.as_str(), true);
            }
            Err(e) => {
                Self::record_item_error(progress, &object.key, SyncAction::Add, e.to_string())
            }
        }
    }

    async fn remove_record(&self, record: &LocalRecord, progress: &mut SyncProgress) {
        match self.index.delete(&record.id).await {
            Ok(()) => {
                progress.removed_from_database += 1;
                metrics::record_sync_item(SyncAction::Remove.as_str(), true);
            }
            Err(e) => {
                Self::record_item_error(progress, &record.key, SyncAction::Remove, e.to_string())
            }
        }
    }

    async fn delete_remote(&self, key: &str, progress: &mut SyncProgress) {
        match self.store.delete_object(key).await {
            Ok(()) => {
                progress.removed_from_remote += 1;
                metrics::record_sync_item(SyncAction::DeleteRemote.as_str(), true);
            }
            Err(e) => {
                Self::record_item_error(progress, key, SyncAction::DeleteRemote, e.to_string())
            }
        }
    }

    fn record_item_error(
        progress: &mut SyncProgress,
        key: &str,
        action: SyncAction,
        message: String,
    ) {
        tracing::warn!(key = %key, action = %action, error = %message, "Sync item failed");
        metrics::record_sync_item(action.as_str(), false);
        progress.errors.push(SyncItemError {
            key: key.to_string(),
            action,
            message,
        });
    }
}
