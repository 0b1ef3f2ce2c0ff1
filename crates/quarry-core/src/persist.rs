//! Snapshot persistence
//!
//! The store serializes its state into a fixed set of artifacts and hands
//! them to a [`SnapshotStore`] as one batch. Artifacts are always written in
//! [`Artifact::WRITE_ORDER`], manifest last, so a manifest on disk implies
//! every artifact it describes was written before it.

use crate::error::{QuarryError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Persisted artifact kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Chunks,
    Vectors,
    Keywords,
    EmbeddingCache,
    Manifest,
}

impl Artifact {
    pub const WRITE_ORDER: [Artifact; 5] = [
        Self::Chunks,
        Self::Vectors,
        Self::Keywords,
        Self::EmbeddingCache,
        Self::Manifest,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Chunks => "chunks.json",
            Self::Vectors => "vectors.json",
            Self::Keywords => "keywords.json",
            Self::EmbeddingCache => "embedding_cache.json",
            Self::Manifest => "manifest.json",
        }
    }

    fn order(&self) -> usize {
        Self::WRITE_ORDER
            .iter()
            .position(|a| a == self)
            .unwrap_or(Self::WRITE_ORDER.len())
    }
}

/// Serialize an artifact body
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize an artifact body, reporting failures as corruption
pub fn decode<T: DeserializeOwned>(artifact: Artifact, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| QuarryError::CorruptSnapshot {
        artifact: artifact.file_name().to_string(),
        message: e.to_string(),
    })
}

/// Storage port for persisted artifacts
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read an artifact; `None` if it has never been written
    async fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>>;

    /// Write a batch of artifacts in [`Artifact::WRITE_ORDER`]
    async fn write_all(&self, batch: Vec<(Artifact, Vec<u8>)>) -> Result<()>;
}

fn ordered(mut batch: Vec<(Artifact, Vec<u8>)>) -> Vec<(Artifact, Vec<u8>)> {
    batch.sort_by_key(|(artifact, _)| artifact.order());
    batch
}

/// Filesystem snapshot store writing each artifact atomically
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    async fn write_atomic(&self, artifact: Artifact, bytes: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let target = self.path_of(artifact);
        let temp = self.dir.join(format!(".{}.tmp", artifact.file_name()));

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &target).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_of(artifact)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, batch: Vec<(Artifact, Vec<u8>)>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        for (artifact, bytes) in ordered(batch) {
            self.write_atomic(artifact, &bytes).await?;
            tracing::debug!("Wrote {} ({} bytes)", artifact.file_name(), bytes.len());
        }
        Ok(())
    }
}

/// In-memory snapshot store for tests and ephemeral stores
#[derive(Default)]
pub struct MemorySnapshotStore {
    artifacts: Mutex<HashMap<Artifact, Vec<u8>>>,
    write_log: Mutex<Vec<Artifact>>,
    fail_on: Mutex<Option<Artifact>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts in the order they were written, across all batches
    pub fn write_log(&self) -> Vec<Artifact> {
        self.write_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Make writes of `artifact` fail until cleared with `None`
    pub fn fail_on(&self, artifact: Option<Artifact>) {
        if let Ok(mut fail) = self.fail_on.lock() {
            *fail = artifact;
        }
    }

    pub fn contains(&self, artifact: Artifact) -> bool {
        self.artifacts
            .lock()
            .map(|a| a.contains_key(&artifact))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(artifacts.get(&artifact).cloned())
    }

    async fn write_all(&self, batch: Vec<(Artifact, Vec<u8>)>) -> Result<()> {
        let fail_on = *self.fail_on.lock().unwrap_or_else(|e| e.into_inner());
        for (artifact, bytes) in ordered(batch) {
            if fail_on == Some(artifact) {
                return Err(QuarryError::Io(std::io::Error::other(format!(
                    "injected write failure for {}",
                    artifact.file_name()
                ))));
            }
            self.artifacts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(artifact, bytes);
            self.write_log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(artifact);
        }
        Ok(())
    }
}
