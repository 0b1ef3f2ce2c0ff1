//! Incremental indexing behaviour of the knowledge store
//!
//! Tests:
//! 1. Unchanged files are skipped and leave persisted state untouched
//! 2. Changed files replace their chunk ids
//! 3. Mixed batches report indexed / updated / skipped
//! 4. Removal is idempotent
//! 5. Vanished files are pruned from scanned roots
//! 6. Failures (extractor panics included) are isolated per file, embedding
//!    errors abort after persisting

mod common;

use async_trait::async_trait;
use common::{chunk_ids, read_manifest, Workspace, DIMENSIONS};
use quarry_core::extract::ChunkOptions;
use quarry_core::{
    Artifact, ChunkDraft, Embedder, Extractor, ExtractorRegistry, FileType, HashEmbedder,
    KnowledgeStore, MemorySnapshotStore, QuarryError, SnapshotStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::test]
async fn test_unchanged_reindex_is_skipped() {
    let ws = Workspace::new();
    ws.write("a.md", "# Alpha\n\nThe quick brown fox jumps over the lazy dog.");
    ws.write("notes/b.txt", "Meeting notes about the harbour survey.");
    let (store, snapshots) = ws.open_in_memory().await;

    let first = store.index_paths(&[]).await.unwrap();
    assert_eq!(first.indexed, 2);

    let before_manifest = read_manifest(snapshots.as_ref()).await;
    let before_chunks = snapshots.read(Artifact::Chunks).await.unwrap();
    let before_vectors = snapshots.read(Artifact::Vectors).await.unwrap();
    let before_keywords = snapshots.read(Artifact::Keywords).await.unwrap();

    let second = store.index_paths(&[]).await.unwrap();
    assert_eq!(second.skipped, 2);
    assert_eq!(second.changed(), 0);

    let after_manifest = read_manifest(snapshots.as_ref()).await;
    assert_eq!(before_manifest.files, after_manifest.files);
    assert_eq!(
        before_manifest.total_chunk_count,
        after_manifest.total_chunk_count
    );
    assert_eq!(before_chunks, snapshots.read(Artifact::Chunks).await.unwrap());
    assert_eq!(before_vectors, snapshots.read(Artifact::Vectors).await.unwrap());
    assert_eq!(before_keywords, snapshots.read(Artifact::Keywords).await.unwrap());
}

#[tokio::test]
async fn test_changed_content_replaces_chunk_ids() {
    let ws = Workspace::new();
    ws.write("a.md", "Original paragraph about lighthouses.");
    let (store, snapshots) = ws.open_in_memory().await;
    store.index_paths(&[]).await.unwrap();
    let old_ids = chunk_ids(&read_manifest(snapshots.as_ref()).await, "a.md");
    assert!(!old_ids.is_empty());

    ws.write("a.md", "Rewritten paragraph about submarines.\n\nAnd a second one.");
    let summary = store.index_paths(&[]).await.unwrap();
    assert_eq!(summary.updated, 1);

    let manifest = read_manifest(snapshots.as_ref()).await;
    let new_ids = chunk_ids(&manifest, "a.md");
    assert!(old_ids.iter().all(|id| !new_ids.contains(id)));

    let stats = store.stats().await;
    assert_eq!(manifest.total_chunk_count, stats.total_chunks);
    assert_eq!(stats.embedding_count, stats.total_chunks);

    let old_text = store
        .search(&quarry_core::SearchRequest::new("lighthouses", 5).with_alpha(0.0))
        .await
        .unwrap();
    assert!(old_text.results.is_empty());
}

#[tokio::test]
async fn test_mixed_batch_counts() {
    let ws = Workspace::new();
    ws.write("A.md", "# A\n\nFile A stays the same.");
    ws.write("B.md", "# B\n\nFile B before the edit.");
    let (store, snapshots) = ws.open_in_memory().await;
    store.index_paths(&[]).await.unwrap();
    let a_before = chunk_ids(&read_manifest(snapshots.as_ref()).await, "A.md");

    ws.write("B.md", "# B\n\nFile B after the edit, with more words.");
    ws.write("C.md", "# C\n\nFile C is brand new.");
    let summary = store.index_paths(&[]).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.indexed, 1);
    assert!(summary.failed.is_empty());

    let manifest = read_manifest(snapshots.as_ref()).await;
    assert_eq!(chunk_ids(&manifest, "A.md"), a_before);
    assert_eq!(manifest.files.len(), 3);
}

#[tokio::test]
async fn test_explicit_file_and_relative_paths() {
    let ws = Workspace::new();
    let file = ws.write("deep/nested/report.md", "Quarterly report on tidal energy.");
    ws.write("other.md", "Not part of this call.");
    let (store, _) = ws.open_in_memory().await;

    let summary = store.index_paths(&[file]).await.unwrap();
    assert_eq!(summary.indexed, 1);

    let doc = store
        .get_document(&PathBuf::from("deep/nested/report.md"), None)
        .await
        .unwrap();
    assert_eq!(doc.path, "deep/nested/report.md");
    assert!(store
        .get_document(&PathBuf::from("other.md"), None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_unsupported_explicit_file_fails_before_mutation() {
    let ws = Workspace::new();
    let good = ws.write("good.md", "Fine content.");
    let bad = ws.write("photo.png", [0u8, 1, 2, 3]);
    let (store, snapshots) = ws.open_in_memory().await;
    let writes_before = snapshots.write_log().len();

    let err = store.index_paths(&[good, bad]).await.unwrap_err();
    assert!(matches!(err, QuarryError::UnsupportedFileType { .. }));
    assert_eq!(store.stats().await.files, 0);
    assert_eq!(snapshots.write_log().len(), writes_before);
}

#[tokio::test]
async fn test_missing_path_is_invalid_input() {
    let ws = Workspace::new();
    let (store, _) = ws.open_in_memory().await;
    let err = store
        .index_paths(&[ws.docs().join("nope")])
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidInput(_)));
}

#[tokio::test]
async fn test_no_roots_is_invalid_input() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.roots.clear();
    let store = ws
        .open_with(config, Arc::new(MemorySnapshotStore::new()))
        .await;
    assert!(matches!(
        store.index_paths(&[]).await,
        Err(QuarryError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_remove_path_is_idempotent() {
    let ws = Workspace::new();
    ws.write("a.md", "Something to forget.");
    ws.write("b.md", "Something to keep.");
    let (store, snapshots) = ws.open_in_memory().await;
    store.index_paths(&[]).await.unwrap();
    let ids = chunk_ids(&read_manifest(snapshots.as_ref()).await, "a.md");

    assert!(store.remove_path(&PathBuf::from("a.md")).await.unwrap());
    assert!(!store.remove_path(&PathBuf::from("a.md")).await.unwrap());

    let manifest = read_manifest(snapshots.as_ref()).await;
    assert!(manifest.get("a.md").is_none());
    assert!(manifest.get("b.md").is_some());
    let chunks = snapshots.read(Artifact::Chunks).await.unwrap().unwrap();
    let chunks = String::from_utf8(chunks).unwrap();
    assert!(ids.iter().all(|id| !chunks.contains(id.as_str())));
    assert_eq!(manifest.total_chunk_count, store.stats().await.total_chunks);
}

#[tokio::test]
async fn test_remove_directory() {
    let ws = Workspace::new();
    ws.write("archive/one.md", "First archived note.");
    ws.write("archive/two.md", "Second archived note.");
    ws.write("current.md", "Still relevant.");
    let (store, _) = ws.open_in_memory().await;
    store.index_paths(&[]).await.unwrap();

    assert!(store.remove_path(&ws.docs().join("archive")).await.unwrap());
    assert_eq!(store.stats().await.files, 1);
}

#[tokio::test]
async fn test_vanished_files_are_pruned() {
    let ws = Workspace::new();
    ws.write("keep.md", "Kept around.");
    ws.write("gone.md", "About to disappear.");
    let (store, _) = ws.open_in_memory().await;
    store.index_paths(&[]).await.unwrap();

    ws.delete("gone.md");
    let summary = store.index_paths(&[]).await.unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.skipped, 1);
    assert!(matches!(
        store.get_document(&PathBuf::from("gone.md"), None).await,
        Err(QuarryError::NotIndexed(_))
    ));
}

#[tokio::test]
async fn test_pruning_can_be_disabled() {
    let ws = Workspace::new();
    ws.write("keep.md", "Kept around.");
    ws.write("gone.md", "About to disappear.");
    let mut config = ws.config();
    config.indexing.prune_missing = false;
    let store = ws
        .open_with(config, Arc::new(MemorySnapshotStore::new()))
        .await;
    store.index_paths(&[]).await.unwrap();

    ws.delete("gone.md");
    let summary = store.index_paths(&[]).await.unwrap();
    assert_eq!(summary.removed, 0);
    assert_eq!(store.stats().await.files, 2);
}

#[tokio::test]
async fn test_extraction_failure_keeps_previous_chunks() {
    let ws = Workspace::new();
    ws.write("log.txt", "Readable log line about turbines.");
    ws.write("other.txt", "Another healthy file.");
    let (store, snapshots) = ws.open_in_memory().await;
    store.index_paths(&[]).await.unwrap();
    let before = chunk_ids(&read_manifest(snapshots.as_ref()).await, "log.txt");

    ws.write("log.txt", [0xffu8, 0xfe, 0x00, 0x80]);
    ws.write("other.txt", "Another healthy file, edited.");
    let summary = store.index_paths(&[]).await.unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].path, "log.txt");
    assert_eq!(summary.updated, 1);
    assert_eq!(
        chunk_ids(&read_manifest(snapshots.as_ref()).await, "log.txt"),
        before
    );
}

#[tokio::test]
async fn test_chunk_cap_marks_partial() {
    let ws = Workspace::new();
    let paragraphs: Vec<String> = (0..20)
        .map(|i| format!("Paragraph {} talks about topic number {} in detail.", i, i))
        .collect();
    ws.write("long.txt", paragraphs.join("\n\n"));

    let mut config = ws.config();
    config.chunking.chunk_chars = 80;
    config.chunking.overlap_chars = 10;
    config.indexing.max_chunks_per_file = Some(3);
    let store = ws
        .open_with(config, Arc::new(MemorySnapshotStore::new()))
        .await;
    store.index_paths(&[]).await.unwrap();

    let stats = store.stats().await;
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.partial_files, 1);
}

/// PDF extractor that panics the way a malformed document can
struct PanickingPdf;

impl Extractor for PanickingPdf {
    fn name(&self) -> &'static str {
        "panicking-pdf"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Pdf]
    }

    fn extract(&self, _path: &Path, _bytes: &[u8]) -> quarry_core::Result<Vec<ChunkDraft>> {
        panic!("malformed pdf")
    }
}

#[tokio::test]
async fn test_extractor_panic_fails_only_its_file() {
    let ws = Workspace::new();
    ws.write("a.md", "A healthy markdown file.");
    ws.write("broken.pdf", b"%PDF-1.4 truncated");

    let mut registry = ExtractorRegistry::with_defaults(ChunkOptions::default());
    registry.register(Arc::new(PanickingPdf));
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let store = KnowledgeStore::builder(ws.config())
        .snapshots(snapshots.clone())
        .embedder(Arc::new(HashEmbedder::new(DIMENSIONS)))
        .extractors(registry)
        .open()
        .await
        .unwrap();

    let summary = store.index_paths(&[]).await.unwrap();
    assert_eq!(summary.indexed, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].path, "broken.pdf");
    assert!(summary.failed[0].error.contains("malformed pdf"));

    let manifest = read_manifest(snapshots.as_ref()).await;
    assert!(manifest.get("a.md").is_some());
    assert!(manifest.get("broken.pdf").is_none());
}

/// Embedder that fails on any text containing "poison"
struct PoisonEmbedder {
    inner: HashEmbedder,
}

#[async_trait]
impl Embedder for PoisonEmbedder {
    async fn embed(&self, text: &str) -> quarry_core::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> quarry_core::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(QuarryError::Embedding("service unavailable".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[tokio::test]
async fn test_embedding_error_persists_applied_files_then_fails() {
    let ws = Workspace::new();
    ws.write("a.txt", "Healthy file one.");
    ws.write("b.txt", "Healthy file two.");
    ws.write("z.txt", "This one contains poison.");

    let snapshots = Arc::new(MemorySnapshotStore::new());
    let mut config = ws.config();
    config.indexing.concurrency = 1;
    let store = KnowledgeStore::builder(config)
        .snapshots(snapshots.clone())
        .embedder(Arc::new(PoisonEmbedder {
            inner: HashEmbedder::new(DIMENSIONS),
        }))
        .open()
        .await
        .unwrap();

    let err = store.index_paths(&[]).await.unwrap_err();
    assert!(matches!(err, QuarryError::Embedding(_)));

    let manifest = read_manifest(snapshots.as_ref()).await;
    assert!(manifest.get("a.txt").is_some());
    assert!(manifest.get("b.txt").is_some());
    assert!(manifest.get("z.txt").is_none());
    assert_eq!(manifest.total_chunk_count, store.stats().await.total_chunks);
}
