//! Shared fixtures for store integration tests

#![allow(dead_code)]

use quarry_core::{Config, HashEmbedder, KnowledgeStore, MemorySnapshotStore, SnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const DIMENSIONS: usize = 64;

/// Scratch workspace with a `docs/` root and a `data/` directory
pub struct Workspace {
    pub temp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("docs")).unwrap();
        Self { temp }
    }

    pub fn docs(&self) -> PathBuf {
        self.temp.path().join("docs")
    }

    pub fn data(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    /// Write `content` to `docs/<rel>`, creating parent directories
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.docs().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn delete(&self, rel: &str) {
        std::fs::remove_file(self.docs().join(rel)).unwrap();
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.base_dir = self.docs();
        config.data_dir = self.data();
        config.roots = vec![self.docs()];
        config.embedding.model = format!("hash-{}", DIMENSIONS);
        config.embedding.dimensions = Some(DIMENSIONS);
        config
    }

    /// Open a store over this workspace backed by `snapshots`
    pub async fn open_with(&self, config: Config, snapshots: Arc<dyn SnapshotStore>) -> KnowledgeStore {
        KnowledgeStore::builder(config)
            .snapshots(snapshots)
            .embedder(Arc::new(HashEmbedder::new(DIMENSIONS)))
            .open()
            .await
            .unwrap()
    }

    /// Open a store persisting into memory
    pub async fn open_in_memory(&self) -> (KnowledgeStore, Arc<MemorySnapshotStore>) {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let store = self.open_with(self.config(), snapshots.clone()).await;
        (store, snapshots)
    }
}

/// Ids of every chunk recorded for `path`
pub fn chunk_ids(manifest: &quarry_core::Manifest, path: &str) -> Vec<String> {
    manifest
        .get(path)
        .map(|r| r.chunk_ids.clone())
        .unwrap_or_default()
}

pub async fn read_manifest(snapshots: &dyn SnapshotStore) -> quarry_core::Manifest {
    let bytes = snapshots
        .read(quarry_core::Artifact::Manifest)
        .await
        .unwrap()
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
