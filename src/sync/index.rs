//! Local index collaborator
//!
//! The reconciliation engine only ever counts, lists, creates and deletes
//! records through [`LocalIndex`]. Two implementations ship with the crate:
//! an in-memory index for tests and embedding, and a JSON file index used by
//! the CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Index errors
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key for owner {owner_id}: {key}")]
    Duplicate { owner_id: String, key: String },
}

/// One indexed asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub id: String,
    pub owner_id: String,
    pub key: String,
    pub title: String,
    pub url: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Fields for a record about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub owner_id: String,
    pub key: String,
    pub title: String,
    pub url: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl NewRecord {
    fn into_record(self) -> LocalRecord {
        LocalRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: self.owner_id,
            key: self.key,
            title: self.title,
            url: self.url,
            size: self.size,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Local index of an owner's assets
#[async_trait]
pub trait LocalIndex: Send + Sync {
    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, IndexError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LocalRecord>, IndexError>;

    async fn create(&self, record: NewRecord) -> Result<LocalRecord, IndexError>;

    async fn delete(&self, id: &str) -> Result<(), IndexError>;
}

fn insert_unique(
    records: &mut Vec<LocalRecord>,
    record: NewRecord,
) -> Result<LocalRecord, IndexError> {
    if records
        .iter()
        .any(|r| r.owner_id == record.owner_id && r.key == record.key)
    {
        return Err(IndexError::Duplicate {
            owner_id: record.owner_id,
            key: record.key,
        });
    }
    let record = record.into_record();
    records.push(record.clone());
    Ok(record)
}

fn remove_by_id(records: &mut Vec<LocalRecord>, id: &str) -> Result<(), IndexError> {
    let before = records.len();
    records.retain(|r| r.id != id);
    if records.len() == before {
        return Err(IndexError::NotFound(id.to_string()));
    }
    Ok(())
}

/// In-memory index
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    records: RwLock<Vec<LocalRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index pre-populated with `records`
    pub fn with_records(records: Vec<LocalRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Copy of every record
    pub fn snapshot(&self) -> Vec<LocalRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl LocalIndex for InMemoryIndex {
    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, IndexError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .count())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LocalRecord>, IndexError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create(&self, record: NewRecord) -> Result<LocalRecord, IndexError> {
        insert_unique(&mut self.records.write(), record)
    }

    async fn delete(&self, id: &str) -> Result<(), IndexError> {
        remove_by_id(&mut self.records.write(), id)
    }
}

/// Index persisted as a single JSON array
///
/// Every mutation rewrites the file through a temp file and rename. A missing
/// file reads as an empty index.
#[derive(Debug)]
pub struct JsonFileIndex {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<LocalRecord>, IndexError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, records: &[LocalRecord]) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LocalIndex for JsonFileIndex {
    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, IndexError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .count())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LocalRecord>, IndexError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.owner_id == owner_id)
            .collect())
    }

    async fn create(&self, record: NewRecord) -> Result<LocalRecord, IndexError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let created = insert_unique(&mut records, record)?;
        self.store(&records).await?;
        Ok(created)
    }

    async fn delete(&self, id: &str) -> Result<(), IndexError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        remove_by_id(&mut records, id)?;
        self.store(&records).await
    }
}
