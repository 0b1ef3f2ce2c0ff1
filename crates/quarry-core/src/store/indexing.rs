//! Incremental indexing and removal

use super::{KnowledgeStore, StoreState};
use crate::chunk::{hash_bytes, Chunk, FileType};
use crate::error::{QuarryError, Result};
use crate::extract::ExtractorRegistry;
use crate::manifest::FileIndexRecord;
use crate::paths::{absolutize, normalize_path, resolve_path};
use crate::scan::{resolve_candidates, ScanOptions};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of one `index_paths` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Files indexed for the first time
    pub indexed: usize,
    /// Previously indexed files whose content changed
    pub updated: usize,
    /// Files whose hash and mtime matched the manifest
    pub skipped: usize,
    /// Manifest entries dropped because their file disappeared
    pub removed: usize,
    /// Files that could not be read or extracted
    pub failed: Vec<IndexFailure>,
}

impl IndexSummary {
    /// Files that changed the live chunk set
    pub fn changed(&self) -> usize {
        self.indexed + self.updated + self.removed
    }
}

/// A file that failed to index; its previous chunks are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub path: String,
    pub error: String,
}

/// Work prepared for one candidate file, ahead of mutation
enum Prepared {
    Unchanged {
        path: String,
    },
    Changed {
        record: FileIndexRecord,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    },
    Failed {
        path: String,
        error: QuarryError,
    },
}

/// File content and extraction result produced on the blocking pool
enum Loaded {
    Unchanged,
    Extracted {
        hash: String,
        mtime: i64,
        size: u64,
        drafts: Vec<crate::chunk::ChunkDraft>,
    },
}

fn task_failed(e: tokio::task::JoinError) -> QuarryError {
    QuarryError::Other(anyhow::anyhow!("indexing task failed: {}", e))
}

fn panic_message(e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return format!("extraction task failed: {}", e);
    }
    let payload = e.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("extractor panicked: {}", detail)
}

fn modified_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
        .unwrap_or(0)
}

/// Read, hash and (when changed) extract one file
fn load_file(
    extractors: &ExtractorRegistry,
    path: &Path,
    file_type: FileType,
    previous: Option<(String, i64)>,
) -> Result<Loaded> {
    let metadata = std::fs::metadata(path)?;
    let bytes = std::fs::read(path)?;
    let hash = hash_bytes(&bytes);
    let mtime = modified_millis(&metadata);

    if let Some((previous_hash, previous_mtime)) = previous {
        if previous_hash == hash && previous_mtime == mtime {
            return Ok(Loaded::Unchanged);
        }
    }

    let drafts = extractors.extract(path, file_type, &bytes)?;
    Ok(Loaded::Extracted {
        hash,
        mtime,
        size: bytes.len() as u64,
        drafts,
    })
}

impl KnowledgeStore {
    /// Bring the index up to date with `paths` (or the configured roots)
    ///
    /// Unchanged files are skipped, changed files are re-extracted and their
    /// old chunks replaced, and with `indexing.prune_missing` files that
    /// vanished from a scanned directory are dropped. State is persisted
    /// before returning, and a mirror sync is queued when one is configured.
    pub async fn index_paths(&self, paths: &[PathBuf]) -> Result<IndexSummary> {
        let _writer = self.writer.lock().await;

        let roots = if paths.is_empty() {
            self.config.roots.clone()
        } else {
            paths.to_vec()
        };
        if roots.is_empty() {
            return Err(QuarryError::InvalidInput(
                "no paths given and no roots configured".to_string(),
            ));
        }
        let base = self.config.base_dir.clone();
        let roots: Vec<PathBuf> = roots.iter().map(|p| absolutize(&base, p)).collect();

        let options = ScanOptions::new(&self.config.include, &self.config.exclude)?;
        let candidates = tokio::task::spawn_blocking(move || resolve_candidates(&roots, &options))
            .await
            .map_err(task_failed)??;
        tracing::info!("Resolved {} candidate files", candidates.len());

        let previous: Vec<Option<(String, i64)>> = {
            let state = self.state.read().await;
            candidates
                .files
                .keys()
                .map(|path| {
                    state
                        .manifest
                        .get(&normalize_path(&base, path))
                        .map(|r| (r.content_hash.clone(), r.mtime))
                })
                .collect()
        };

        let mut summary = IndexSummary::default();
        let work = candidates
            .files
            .iter()
            .zip(previous)
            .map(|((path, file_type), previous)| self.prepare(path.clone(), *file_type, previous));
        let prepared = stream::iter(work).buffered(self.config.indexing.concurrency);
        let mut prepared = std::pin::pin!(prepared);

        let mut aborted = None;
        while let Some(item) = prepared.next().await {
            match item {
                Ok(Prepared::Unchanged { path }) => {
                    tracing::debug!("Unchanged: {}", path);
                    summary.skipped += 1;
                }
                Ok(Prepared::Failed { path, error }) => {
                    tracing::warn!("Failed to index {}: {}", path, error);
                    summary.failed.push(IndexFailure {
                        path,
                        error: error.to_string(),
                    });
                }
                Ok(Prepared::Changed {
                    record,
                    chunks,
                    vectors,
                }) => {
                    let path = record.path.clone();
                    let mut state = self.state.write().await;
                    match apply(&mut state, record, chunks, vectors) {
                        Ok(true) => {
                            tracing::debug!("Updated: {}", path);
                            summary.updated += 1;
                        }
                        Ok(false) => {
                            tracing::debug!("Indexed: {}", path);
                            summary.indexed += 1;
                        }
                        Err(e) => {
                            aborted = Some(e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    aborted = Some(e);
                    break;
                }
            }
        }

        let mut state = self.state.write().await;

        if let Some(error) = aborted {
            tracing::warn!(
                "Indexing aborted after {} files: {}",
                summary.indexed + summary.updated,
                error
            );
            if let Err(persist_error) = self.persist(&mut state).await {
                tracing::warn!("Failed to persist partial index: {}", persist_error);
            }
            return Err(error);
        }

        if self.config.indexing.prune_missing && !candidates.scanned_dirs.is_empty() {
            let present: HashSet<String> = candidates
                .files
                .keys()
                .map(|path| normalize_path(&base, path))
                .collect();
            let missing: Vec<String> = state
                .manifest
                .files
                .keys()
                .filter(|path| !present.contains(*path))
                .filter(|path| {
                    let absolute = resolve_path(&base, path);
                    candidates
                        .scanned_dirs
                        .iter()
                        .any(|dir| absolute.starts_with(dir))
                })
                .cloned()
                .collect();
            for path in missing {
                tracing::debug!("Removed: {}", path);
                state.purge_file(&path);
                summary.removed += 1;
            }
        }

        self.persist(&mut state).await?;
        tracing::info!(
            "Indexed {} new, {} updated, {} unchanged, {} removed, {} failed ({} chunks total)",
            summary.indexed,
            summary.updated,
            summary.skipped,
            summary.removed,
            summary.failed.len(),
            state.chunks.len()
        );

        self.dispatch_mirror(&state);
        Ok(summary)
    }

    /// Read, extract and embed one file without touching the store state
    ///
    /// Read and extraction errors (panics included) become
    /// [`Prepared::Failed`]; embedding errors are returned and abort the batch.
    async fn prepare(
        &self,
        path: PathBuf,
        file_type: FileType,
        previous: Option<(String, i64)>,
    ) -> Result<Prepared> {
        let relative = normalize_path(&self.config.base_dir, &path);
        let extractors = Arc::clone(&self.extractors);
        let source = path.clone();

        // A panicking extractor fails only its own file
        let loaded = tokio::task::spawn_blocking(move || {
            load_file(&extractors, &source, file_type, previous)
        })
        .await
        .unwrap_or_else(|e| Err(QuarryError::extraction(&path, panic_message(e))));

        let (hash, mtime, size, mut drafts) = match loaded {
            Ok(Loaded::Unchanged) => return Ok(Prepared::Unchanged { path: relative }),
            Ok(Loaded::Extracted {
                hash,
                mtime,
                size,
                drafts,
            }) => (hash, mtime, size, drafts),
            Err(error) => {
                return Ok(Prepared::Failed {
                    path: relative,
                    error,
                })
            }
        };

        let partial = match self.config.indexing.max_chunks_per_file {
            Some(max) if drafts.len() > max => {
                tracing::warn!(
                    "{} produced {} chunks, keeping the first {}",
                    relative,
                    drafts.len(),
                    max
                );
                drafts.truncate(max);
                true
            }
            _ => false,
        };

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .enumerate()
            .map(|(ordinal, draft)| {
                Chunk::from_draft(draft, &relative, file_type, &hash, ordinal, mtime, partial)
            })
            .collect();

        let items: Vec<(String, String)> = chunks
            .iter()
            .map(|c| (c.id.clone(), c.text.clone()))
            .collect();
        let vectors = self
            .cache
            .embed_many(self.embedder.as_ref(), &items)
            .await?;

        let record = FileIndexRecord {
            path: relative,
            chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            mtime,
            size,
            content_hash: hash,
            file_type,
            partial,
        };

        Ok(Prepared::Changed {
            record,
            chunks,
            vectors,
        })
    }

    /// Remove a file (or every file under a directory) from the index
    ///
    /// Returns false when nothing was indexed at that path.
    pub async fn remove_path(&self, path: &Path) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let relative = normalize_path(&self.config.base_dir, path);

        let mut state = self.state.write().await;
        let targets: Vec<String> = if state.manifest.get(&relative).is_some() {
            vec![relative.clone()]
        } else if relative.is_empty() {
            Vec::new()
        } else {
            state
                .manifest
                .paths_within(&relative)
                .map(str::to_string)
                .collect()
        };

        if targets.is_empty() {
            tracing::debug!("Not indexed, nothing to remove: {}", relative);
            return Ok(false);
        }

        for target in &targets {
            state.purge_file(target);
        }
        self.persist(&mut state).await?;
        tracing::info!("Removed {} file(s) under {}", targets.len(), relative);

        self.dispatch_mirror(&state);
        Ok(true)
    }
}

/// Replace a file's chunks with a freshly prepared set
///
/// Returns whether the file was indexed before. Vectors are validated
/// against the index dimension before anything is mutated.
fn apply(
    state: &mut StoreState,
    record: FileIndexRecord,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
) -> Result<bool> {
    if chunks.len() != vectors.len() {
        return Err(QuarryError::Embedding(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }
    if vectors.iter().any(Vec::is_empty) {
        return Err(QuarryError::Embedding(format!(
            "embedder returned an empty vector for {}",
            record.path
        )));
    }
    let owned_by_file = state
        .manifest
        .get(&record.path)
        .map_or(0, |r| r.chunk_ids.len());
    let replaces_everything = owned_by_file == state.vectors.len();
    if let (Some(expected), false) = (state.vectors.dimensions(), replaces_everything) {
        if let Some(v) = vectors.iter().find(|v| v.len() != expected) {
            return Err(QuarryError::DimensionMismatch {
                expected,
                actual: v.len(),
            });
        }
    }
    if let Some(first) = vectors.first() {
        if let Some(v) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(QuarryError::DimensionMismatch {
                expected: first.len(),
                actual: v.len(),
            });
        }
    }

    let existed = state.purge_file(&record.path);
    for (chunk, vector) in chunks.into_iter().zip(vectors) {
        state.vectors.upsert(&chunk.id, vector)?;
        state.keywords.upsert(&chunk.id, chunk.keyword_text(), &chunk.tags);
        state.chunks.insert(chunk.id.clone(), chunk);
    }
    state.manifest.upsert(record);
    Ok(existed)
}
