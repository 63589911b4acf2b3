// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Local archive of completed analyses.
//!
//! The whole archive is one JSON array stored under one key, newest entry
//! first. [`HistoryStore`] keeps the authoritative copy in memory and writes
//! the full blob back after every change; storage failures are reported to
//! the caller but never undo the in-memory change.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::model::{AnalysisResult, HistoryEntry};
use crate::parameters::ParameterSet;

/// A single named blob in some key-value medium.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<String>, PersistenceError>;
    async fn save(&self, blob: &str) -> Result<(), PersistenceError>;
    /// Removing an absent blob succeeds.
    async fn remove(&self) -> Result<(), PersistenceError>;
    fn describe(&self) -> String;
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ArchiveStorage for FileStorage {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, blob: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // write-then-rename keeps the previous archive intact if we die mid-write
        let staging = self.staging_path();
        tokio::fs::write(&staging, blob).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn remove(&self) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// One Redis string key.
#[derive(Clone)]
pub struct RedisStorage {
    client: redis::Client,
    key: String,
}

impl RedisStorage {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| {
                PersistenceError::Backend(format!("Failed to create Redis client: {}", e))
            })?;

        Ok(Self {
            client,
            key: key.into(),
        })
    }

    /// Test the Redis connection
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        let mut conn = self.connection().await?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| PersistenceError::Backend(format!("Redis PING failed: {}", e)))?;

        Ok(())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, PersistenceError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PersistenceError::Backend(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl ArchiveStorage for RedisStorage {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        let mut conn = self.connection().await?;
        conn.get(&self.key)
            .await
            .map_err(|e| PersistenceError::Backend(format!("Redis GET failed: {}", e)))
    }

    async fn save(&self, blob: &str) -> Result<(), PersistenceError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(&self.key, blob)
            .await
            .map_err(|e| PersistenceError::Backend(format!("Redis SET failed: {}", e)))
    }

    async fn remove(&self) -> Result<(), PersistenceError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(&self.key)
            .await
            .map_err(|e| PersistenceError::Backend(format!("Redis DEL failed: {}", e)))
    }

    fn describe(&self) -> String {
        format!("redis key {}", self.key)
    }
}

pub fn encode_archive(entries: &[HistoryEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string(entries)
}

pub fn decode_archive(blob: &str) -> Result<Vec<HistoryEntry>, serde_json::Error> {
    let entries: Vec<HistoryEntry> = serde_json::from_str(blob)?;

    // a hand-edited archive may repeat ids; first (newest) copy wins
    let mut seen = HashSet::with_capacity(entries.len());
    Ok(entries.into_iter().filter(|e| seen.insert(e.id)).collect())
}

/// Ids are millisecond timestamps; anything past 9999-12-31T23:59:59.999Z
/// came from a hand-edited archive and does not drive id allocation.
const MAX_TRACKED_ID: i64 = 253_402_300_799_999;

struct Archive {
    entries: Vec<HistoryEntry>,
    last_id: i64,
}

impl Archive {
    fn new(entries: Vec<HistoryEntry>) -> Self {
        let last_id = entries
            .iter()
            .map(|e| e.id)
            .filter(|id| *id <= MAX_TRACKED_ID)
            .max()
            .unwrap_or(0);
        Self { entries, last_id }
    }

    /// Strictly increasing even when two analyses land in the same millisecond.
    fn next_id(&self, now_millis: i64) -> i64 {
        let mut id = now_millis.clamp(0, MAX_TRACKED_ID).max(self.last_id + 1);
        while self.entries.iter().any(|e| e.id == id) {
            id += 1;
        }
        id
    }
}

/// Result of [`HistoryStore::append`]. The entry is always kept in memory;
/// `persist_error` says whether it also reached storage.
pub struct AppendOutcome {
    pub entry: HistoryEntry,
    pub persist_error: Option<PersistenceError>,
}

#[derive(Clone)]
pub struct HistoryStore {
    storage: Arc<dyn ArchiveStorage>,
    archive: Arc<RwLock<Archive>>,
}

impl HistoryStore {
    /// Load the archive. Missing or unreadable storage starts an empty history.
    pub async fn open(storage: impl ArchiveStorage + 'static) -> Self {
        let entries = match storage.load().await {
            Ok(Some(blob)) => decode_archive(&blob).unwrap_or_else(|error| {
                tracing::warn!(
                    %error,
                    storage = %storage.describe(),
                    "history archive is corrupt; starting empty"
                );
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::warn!(
                    %error,
                    storage = %storage.describe(),
                    "failed to read history archive; starting empty"
                );
                Vec::new()
            }
        };

        tracing::info!(
            entries = entries.len(),
            storage = %storage.describe(),
            "history archive loaded"
        );

        Self {
            storage: Arc::new(storage),
            archive: Arc::new(RwLock::new(Archive::new(entries))),
        }
    }

    pub async fn append(&self, inputs: ParameterSet, result: AnalysisResult) -> AppendOutcome {
        let mut guard = self.archive.write().await;

        let created_at = Utc::now();
        let id = guard.next_id(created_at.timestamp_millis());
        let entry = HistoryEntry {
            id,
            created_at,
            inputs,
            result,
        };

        guard.entries.insert(0, entry.clone());
        guard.last_id = id;

        let persist_error = self.persist(&guard.entries).await.err();
        if let Some(error) = &persist_error {
            tracing::warn!(%error, id, "history entry kept in memory only");
        } else {
            tracing::debug!(id, total = guard.entries.len(), "history entry stored");
        }

        AppendOutcome {
            entry,
            persist_error,
        }
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<HistoryEntry> {
        self.archive.read().await.entries.clone()
    }

    pub async fn get(&self, id: i64) -> Option<HistoryEntry> {
        self.archive
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.archive.read().await.entries.len()
    }

    /// Returns whether anything was removed. Unknown ids are a no-op and do not
    /// touch storage.
    pub async fn remove(&self, id: i64) -> Result<bool, PersistenceError> {
        let mut guard = self.archive.write().await;

        let Some(index) = guard.entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };

        guard.entries.remove(index);
        self.persist(&guard.entries).await?;
        tracing::debug!(id, remaining = guard.entries.len(), "history entry removed");

        Ok(true)
    }

    /// Drop every entry and delete the stored blob. Returns how many were dropped.
    pub async fn clear(&self) -> Result<usize, PersistenceError> {
        let mut guard = self.archive.write().await;
        let cleared = guard.entries.len();
        guard.entries.clear();

        self.storage.remove().await?;
        tracing::info!(cleared, "history archive cleared");

        Ok(cleared)
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<(), PersistenceError> {
        let blob = encode_archive(entries)?;
        self.storage.save(&blob).await
    }
}
