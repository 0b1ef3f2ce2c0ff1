//! Knowledge store
//!
//! Owns the chunk set, both indexes and the manifest behind a single
//! `RwLock`, and coordinates indexing, querying, persistence and the
//! optional remote mirror. Mutating operations are serialized by a writer
//! mutex; reads proceed concurrently.

mod indexing;
mod query;
mod stats;

pub use indexing::{IndexFailure, IndexSummary};
pub use query::Document;
pub use stats::StoreStats;

use crate::chunk::Chunk;
use crate::config::{Config, MirrorConfig};
use crate::embedding::{self, CacheSnapshot, Embedder, EmbeddingCache};
use crate::error::{QuarryError, Result};
use crate::extract::{ChunkOptions, ExtractorRegistry};
use crate::index::{KeywordIndex, VectorIndex};
use crate::manifest::Manifest;
use crate::mirror::{MirrorReport, MirrorSnapshot, MirrorSync, RemoteStore, SqliteRemoteStore};
use crate::persist::{decode, encode, Artifact, FsSnapshotStore, SnapshotStore};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Mutable state guarded by the store lock
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub chunks: BTreeMap<String, Chunk>,
    pub vectors: VectorIndex,
    pub keywords: KeywordIndex,
    pub manifest: Manifest,
}

impl StoreState {
    /// Drop a chunk from the chunk set and both indexes
    fn purge_chunk(&mut self, id: &str) {
        self.chunks.remove(id);
        self.vectors.remove(id);
        self.keywords.remove(id);
    }

    /// Drop a file's manifest entry and every chunk it owned
    fn purge_file(&mut self, path: &str) -> bool {
        match self.manifest.remove(path) {
            Some(record) => {
                for id in &record.chunk_ids {
                    self.purge_chunk(id);
                }
                true
            }
            None => false,
        }
    }

    /// Align loaded artifacts with the manifest, which is written last
    ///
    /// Chunks and index entries the manifest does not reference are left over
    /// from an interrupted write and are dropped. A referenced chunk that is
    /// missing from any artifact cannot be recovered.
    fn reconcile(&mut self) -> Result<usize> {
        let corrupt = |artifact: Artifact, message: String| QuarryError::CorruptSnapshot {
            artifact: artifact.file_name().to_string(),
            message,
        };

        let mut live = HashSet::new();
        for record in self.manifest.files.values() {
            for id in &record.chunk_ids {
                let missing_from = if !self.chunks.contains_key(id) {
                    Some(Artifact::Chunks)
                } else if !self.vectors.contains(id) {
                    Some(Artifact::Vectors)
                } else if !self.keywords.contains(id) {
                    Some(Artifact::Keywords)
                } else {
                    None
                };
                if let Some(artifact) = missing_from {
                    return Err(corrupt(
                        artifact,
                        format!("chunk {} of {} is missing", id, record.path),
                    ));
                }
                live.insert(id.clone());
            }
        }

        let stale: BTreeSet<String> = self
            .chunks
            .keys()
            .map(String::as_str)
            .chain(self.vectors.ids())
            .chain(self.keywords.ids())
            .filter(|id| !live.contains(*id))
            .map(str::to_string)
            .collect();
        for id in &stale {
            self.purge_chunk(id);
        }

        if self.manifest.total_chunk_count != self.chunks.len() {
            return Err(corrupt(
                Artifact::Manifest,
                format!(
                    "manifest records {} chunks but {} are live",
                    self.manifest.total_chunk_count,
                    self.chunks.len()
                ),
            ));
        }
        Ok(stale.len())
    }
}

/// Builder for [`KnowledgeStore`] with injectable ports
pub struct KnowledgeStoreBuilder {
    config: Config,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    extractors: Option<Arc<ExtractorRegistry>>,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl KnowledgeStoreBuilder {
    pub fn snapshots(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = Some(Arc::new(extractors));
        self
    }

    /// Mirror into `remote` instead of the configured SQLite database
    pub fn remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Load persisted state (or start fresh) and return the ready store
    pub async fn open(self) -> Result<KnowledgeStore> {
        let config = self.config;
        config.validate()?;

        let snapshots = self
            .snapshots
            .unwrap_or_else(|| Arc::new(FsSnapshotStore::new(config.data_dir.clone())));
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => embedding::from_config(&config.embedding)?,
        };
        let extractors = self.extractors.unwrap_or_else(|| {
            Arc::new(ExtractorRegistry::with_defaults(ChunkOptions::from(
                &config.chunking,
            )))
        });

        let mirror = match (self.remote, &config.mirror) {
            (Some(remote), mirror_config) => {
                let mirror_config = mirror_config
                    .clone()
                    .unwrap_or_else(|| MirrorConfig::new(config.data_dir.join("mirror.sqlite")));
                Some(Arc::new(MirrorSync::new(remote, mirror_config)))
            }
            (None, Some(mirror_config)) => {
                match SqliteRemoteStore::open(&mirror_config.sqlite_path) {
                    Ok(remote) => Some(Arc::new(MirrorSync::new(
                        Arc::new(remote),
                        mirror_config.clone(),
                    ))),
                    Err(e) => {
                        tracing::warn!(
                            "Mirror disabled, cannot open {}: {}",
                            mirror_config.sqlite_path.display(),
                            e
                        );
                        None
                    }
                }
            }
            (None, None) => None,
        };

        let (state, cache, fresh) = load_state(snapshots.as_ref()).await?;

        let store = KnowledgeStore {
            config,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            snapshots,
            embedder,
            cache: Arc::new(cache),
            extractors,
            mirror,
            mirror_task: std::sync::Mutex::new(None),
        };

        if fresh {
            tracing::info!("No manifest found, starting a fresh store");
            let mut state = store.state.write().await;
            store.persist(&mut state).await?;
        } else {
            let state = store.state.read().await;
            tracing::info!(
                "Loaded {} files ({} chunks)",
                state.manifest.files.len(),
                state.chunks.len()
            );
        }

        Ok(store)
    }
}

/// Local-first hybrid retrieval store
pub struct KnowledgeStore {
    config: Config,
    state: RwLock<StoreState>,
    writer: Mutex<()>,
    snapshots: Arc<dyn SnapshotStore>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    extractors: Arc<ExtractorRegistry>,
    mirror: Option<Arc<MirrorSync>>,
    mirror_task: std::sync::Mutex<Option<JoinHandle<Option<MirrorReport>>>>,
}

impl KnowledgeStore {
    pub fn builder(config: Config) -> KnowledgeStoreBuilder {
        KnowledgeStoreBuilder {
            config,
            snapshots: None,
            embedder: None,
            extractors: None,
            remote: None,
        }
    }

    /// Open a store with the default ports for `config`
    pub async fn open(config: Config) -> Result<Self> {
        Self::builder(config).open().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Serialize every artifact and hand them to the snapshot store
    async fn persist(&self, state: &mut StoreState) -> Result<()> {
        let live = &state.chunks;
        let pruned = self.cache.retain_corpus(|id| live.contains_key(id));
        if pruned > 0 {
            tracing::debug!("Pruned {} stale cache entries", pruned);
        }

        state.manifest.touch(state.chunks.len());
        let chunks: Vec<&Chunk> = state.chunks.values().collect();
        let batch = vec![
            (Artifact::Chunks, encode(&chunks)?),
            (Artifact::Vectors, encode(&state.vectors)?),
            (Artifact::Keywords, encode(&state.keywords)?),
            (Artifact::EmbeddingCache, encode(&self.cache.snapshot())?),
            (Artifact::Manifest, encode(&state.manifest)?),
        ];
        self.snapshots.write_all(batch).await
    }

    /// Queue a best-effort mirror sync of `state` behind any in-flight one
    fn dispatch_mirror(&self, state: &StoreState) {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };
        let snapshot = match capture(state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Failed to capture mirror snapshot: {}", e);
                return;
            }
        };

        let mut task = self.mirror_task.lock().unwrap_or_else(|e| e.into_inner());
        let previous = task.take();
        *task = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            match mirror.sync_with_retry(&snapshot).await {
                Ok(report) => {
                    tracing::info!(
                        "Mirror sync: {} uploaded, {} skipped, {} deleted",
                        report.uploaded,
                        report.skipped,
                        report.deleted
                    );
                    Some(report)
                }
                Err(e) => {
                    tracing::warn!("Mirror sync failed: {}", e);
                    None
                }
            }
        }));
    }

    /// Wait for the in-flight mirror sync, if any
    ///
    /// Returns the report of the last queued sync, or `None` when nothing was
    /// queued or that sync failed.
    pub async fn wait_for_mirror(&self) -> Option<MirrorReport> {
        let handle = self
            .mirror_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        match handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Mirror task failed: {}", e);
                None
            }
        }
    }

    /// Run a mirror sync now and report its outcome
    pub async fn sync_mirror(&self) -> Result<MirrorReport> {
        let mirror = self
            .mirror
            .clone()
            .ok_or_else(|| QuarryError::Config("no mirror configured or it failed to open".to_string()))?;
        self.wait_for_mirror().await;
        let snapshot = {
            let state = self.state.read().await;
            capture(&state)?
        };
        mirror.sync_with_retry(&snapshot).await
    }
}

fn capture(state: &StoreState) -> Result<MirrorSnapshot> {
    MirrorSnapshot::capture(&state.manifest, &state.chunks, |id| {
        state.vectors.get(id).map(<[f32]>::to_vec)
    })
}

async fn read_required(snapshots: &dyn SnapshotStore, artifact: Artifact) -> Result<Vec<u8>> {
    snapshots
        .read(artifact)
        .await?
        .ok_or_else(|| QuarryError::CorruptSnapshot {
            artifact: artifact.file_name().to_string(),
            message: "missing while manifest exists".to_string(),
        })
}

/// Load persisted state; `fresh` is true when no manifest exists yet
async fn load_state(snapshots: &dyn SnapshotStore) -> Result<(StoreState, EmbeddingCache, bool)> {
    let Some(manifest) = snapshots.read(Artifact::Manifest).await? else {
        return Ok((StoreState::default(), EmbeddingCache::new(), true));
    };
    let manifest: Manifest = decode(Artifact::Manifest, &manifest)?;

    let chunks: Vec<Chunk> = decode(
        Artifact::Chunks,
        &read_required(snapshots, Artifact::Chunks).await?,
    )?;
    let vectors: VectorIndex = decode(
        Artifact::Vectors,
        &read_required(snapshots, Artifact::Vectors).await?,
    )?;
    let keywords: KeywordIndex = decode(
        Artifact::Keywords,
        &read_required(snapshots, Artifact::Keywords).await?,
    )?;
    let cache = match snapshots.read(Artifact::EmbeddingCache).await? {
        Some(bytes) => {
            EmbeddingCache::from_snapshot(decode::<CacheSnapshot>(Artifact::EmbeddingCache, &bytes)?)
        }
        None => EmbeddingCache::new(),
    };

    let mut state = StoreState {
        chunks: chunks.into_iter().map(|c| (c.id.clone(), c)).collect(),
        vectors,
        keywords,
        manifest,
    };
    let stale = state.reconcile()?;
    if stale > 0 {
        tracing::warn!(
            "Dropped {} chunks not referenced by the manifest (interrupted write?)",
            stale
        );
    }
    Ok((state, cache, false))
}
