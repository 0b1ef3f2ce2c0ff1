//! Best-effort remote mirror
//!
//! After local persistence the store replicates documents, chunks and
//! embeddings to a [`RemoteStore`]. Documents whose digest already matches
//! the remote copy are skipped, remote documents no longer present locally
//! are deleted, and a manifest snapshot is recorded per sync.

use crate::chunk::{Chunk, FileType};
use crate::config::MirrorConfig;
use crate::error::Result;
use crate::manifest::{FileIndexRecord, Manifest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

mod memory;
mod sqlite;

pub use memory::MemoryRemoteStore;
pub use sqlite::SqliteRemoteStore;

/// Chunk row replicated to the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorChunk {
    pub id: String,
    pub ordinal: usize,
    pub page: Option<u32>,
    pub offset_start: Option<usize>,
    pub offset_end: Option<usize>,
    pub text: String,
    /// Empty when the chunk has no stored vector
    pub embedding: Vec<f32>,
}

/// Document replicated to the remote store with its chunks
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorDocument {
    pub path: String,
    pub digest: String,
    pub mtime: i64,
    pub size: u64,
    pub file_type: FileType,
    pub chunks: Vec<MirrorChunk>,
}

/// Point-in-time copy of local state handed to the mirror task
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    pub documents: Vec<MirrorDocument>,
    pub manifest_json: String,
    pub total_chunk_count: usize,
}

impl MirrorSnapshot {
    /// Copy everything the mirror needs out of the store state
    pub fn capture<F>(
        manifest: &Manifest,
        chunks: &BTreeMap<String, Chunk>,
        vector_of: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<Vec<f32>>,
    {
        let documents = manifest
            .files
            .values()
            .map(|record| MirrorDocument {
                path: record.path.clone(),
                digest: document_digest(record),
                mtime: record.mtime,
                size: record.size,
                file_type: record.file_type,
                chunks: record
                    .chunk_ids
                    .iter()
                    .filter_map(|id| chunks.get(id))
                    .map(|chunk| MirrorChunk {
                        id: chunk.id.clone(),
                        ordinal: chunk.ordinal,
                        page: chunk.page,
                        offset_start: chunk.offset_start,
                        offset_end: chunk.offset_end,
                        text: chunk.text.clone(),
                        embedding: vector_of(&chunk.id).unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            documents,
            manifest_json: serde_json::to_string(manifest)?,
            total_chunk_count: manifest.total_chunk_count,
        })
    }
}

/// Digest of a file's indexed state: path, mtime, size and ordered chunk ids
pub fn document_digest(record: &FileIndexRecord) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(record.path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&record.mtime.to_le_bytes());
    hasher.update(&record.size.to_le_bytes());
    for id in &record.chunk_ids {
        hasher.update(id.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Remote replication target
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create the namespace if it does not exist
    async fn ensure_source(&self, namespace: &str) -> Result<()>;

    /// Path → digest for every document in the namespace
    async fn document_digests(&self, namespace: &str) -> Result<HashMap<String, String>>;

    /// Replace a document and all its chunk rows
    async fn replace_document(&self, namespace: &str, document: &MirrorDocument) -> Result<()>;

    /// Delete documents (and their chunks) by path
    async fn delete_documents(&self, namespace: &str, paths: &[String]) -> Result<usize>;

    /// Record a manifest snapshot
    async fn record_snapshot(
        &self,
        namespace: &str,
        manifest_json: &str,
        total_chunk_count: usize,
        taken_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Keep only the newest `retain` snapshots, returning how many were removed
    async fn prune_snapshots(&self, namespace: &str, retain: usize) -> Result<usize>;
}

/// Outcome of one mirror sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReport {
    pub uploaded: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub snapshots_pruned: usize,
}

/// Drives replication into a [`RemoteStore`]
pub struct MirrorSync {
    remote: Arc<dyn RemoteStore>,
    config: MirrorConfig,
}

impl MirrorSync {
    pub fn new(remote: Arc<dyn RemoteStore>, config: MirrorConfig) -> Self {
        Self { remote, config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// One sync pass
    pub async fn sync(&self, snapshot: &MirrorSnapshot) -> Result<MirrorReport> {
        let namespace = self.config.namespace.as_str();
        let mut report = MirrorReport::default();

        self.remote.ensure_source(namespace).await?;
        let remote_digests = self.remote.document_digests(namespace).await?;

        for document in &snapshot.documents {
            if remote_digests.get(&document.path) == Some(&document.digest) {
                report.skipped += 1;
                continue;
            }
            self.remote.replace_document(namespace, document).await?;
            report.uploaded += 1;
        }

        let local: HashSet<&str> = snapshot.documents.iter().map(|d| d.path.as_str()).collect();
        let mut stale: Vec<String> = remote_digests
            .keys()
            .filter(|path| !local.contains(path.as_str()))
            .cloned()
            .collect();
        stale.sort();
        if !stale.is_empty() {
            report.deleted = self.remote.delete_documents(namespace, &stale).await?;
        }

        self.remote
            .record_snapshot(
                namespace,
                &snapshot.manifest_json,
                snapshot.total_chunk_count,
                Utc::now(),
            )
            .await?;
        report.snapshots_pruned = self
            .remote
            .prune_snapshots(namespace, self.config.retain_snapshots)
            .await?;

        Ok(report)
    }

    /// Sync with exponential backoff between failed attempts
    pub async fn sync_with_retry(&self, snapshot: &MirrorSnapshot) -> Result<MirrorReport> {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut attempt = 1;
        loop {
            match self.sync(snapshot).await {
                Ok(report) => return Ok(report),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Mirror sync attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, ids: &[&str]) -> FileIndexRecord {
        FileIndexRecord {
            path: path.to_string(),
            chunk_ids: ids.iter().map(|s| s.to_string()).collect(),
            mtime: 10,
            size: 20,
            content_hash: "h".to_string(),
            file_type: FileType::Text,
            partial: false,
        }
    }

    fn snapshot(records: &[FileIndexRecord]) -> MirrorSnapshot {
        let mut manifest = Manifest::new();
        for r in records {
            manifest.upsert(r.clone());
        }
        MirrorSnapshot::capture(&manifest, &BTreeMap::new(), |_| None).unwrap()
    }

    fn config() -> MirrorConfig {
        let mut config = MirrorConfig::new("unused.db");
        config.initial_backoff_ms = 1;
        config
    }

    #[test]
    fn test_digest_covers_inputs() {
        let base = document_digest(&record("a.txt", &["1", "2"]));
        assert_eq!(base, document_digest(&record("a.txt", &["1", "2"])));
        assert_ne!(base, document_digest(&record("a.txt", &["2", "1"])));
        assert_ne!(base, document_digest(&record("b.txt", &["1", "2"])));

        let mut touched = record("a.txt", &["1", "2"]);
        touched.mtime = 11;
        assert_ne!(base, document_digest(&touched));

        // content hash is not part of the digest
        let mut rehashed = record("a.txt", &["1", "2"]);
        rehashed.content_hash = "other".to_string();
        assert_eq!(base, document_digest(&rehashed));
    }

    #[tokio::test]
    async fn test_sync_skips_unchanged_and_deletes_stale() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let sync = MirrorSync::new(remote.clone(), config());

        let first = sync
            .sync(&snapshot(&[record("a.txt", &["1"]), record("b.txt", &["2"])]))
            .await
            .unwrap();
        assert_eq!(first.uploaded, 2);

        let second = sync
            .sync(&snapshot(&[record("a.txt", &["1"]), record("c.txt", &["3"])]))
            .await
            .unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.uploaded, 1);
        assert_eq!(second.deleted, 1);
        assert_eq!(remote.document_paths("default"), vec!["a.txt", "c.txt"]);
        assert_eq!(remote.replace_calls(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_retention() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let mut cfg = config();
        cfg.retain_snapshots = 2;
        let sync = MirrorSync::new(remote.clone(), cfg);
        let snap = snapshot(&[record("a.txt", &["1"])]);
        for _ in 0..4 {
            sync.sync(&snap).await.unwrap();
        }
        assert_eq!(remote.snapshot_count("default"), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_available(false);
        let mut cfg = config();
        cfg.max_attempts = 3;
        let sync = MirrorSync::new(remote.clone(), cfg);
        assert!(sync
            .sync_with_retry(&snapshot(&[record("a.txt", &["1"])]))
            .await
            .is_err());
        assert_eq!(remote.failed_calls(), 3);
    }
}
