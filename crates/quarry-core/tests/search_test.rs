//! Hybrid search and document retrieval through the knowledge store
//!
//! Tests:
//! 1. Tag-filtered hybrid query finds the tagged chunk
//! 2. Filters only ever narrow the result set
//! 3. alpha = 1 / alpha = 0 reproduce the vector and keyword index rankings
//! 4. Trivial requests and invalid alpha
//! 5. get_document ordering, page selection and NotIndexed

mod common;

use common::Workspace;
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, TestRunner};
use quarry_core::extract::ChunkOptions;
use quarry_core::index::{KeywordIndex, VectorIndex};
use quarry_core::{
    Artifact, ChunkDraft, Extractor, ExtractorRegistry, FileType, HashEmbedder, KnowledgeStore,
    MemorySnapshotStore, QuarryError, SearchRequest, SnapshotStore,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CORPUS: &[(&str, &str)] = &[
    (
        "ops/brief.md",
        "---\ntags: [ops, restricted]\n---\nAssessment of cocaine smuggling corridor risk along the northern coast.",
    ),
    (
        "news/coast.md",
        "---\ntags: news\n---\nLocal fishermen report smuggling boats near the harbour at night.",
    ),
    (
        "notes/garden.txt",
        "Tomatoes need full sun and regular watering through the summer.",
    ),
    (
        "notes/routes.txt",
        "Shipping corridor congestion increased during the winter storms.",
    ),
    (
        "notes/risk.txt",
        "Risk register: flooding, supplier delays and staff turnover.",
    ),
];

async fn corpus_store(ws: &Workspace) -> KnowledgeStore {
    for (path, content) in CORPUS {
        ws.write(path, content);
    }
    let (store, _) = ws.open_in_memory().await;
    let summary = store.index_paths(&[]).await.unwrap();
    assert_eq!(summary.indexed, CORPUS.len());
    store
}

#[tokio::test]
async fn test_tagged_query_finds_ops_brief() {
    let ws = Workspace::new();
    let store = corpus_store(&ws).await;

    let request = SearchRequest::new("smuggling corridor", 1)
        .with_alpha(0.5)
        .with_tags(vec!["ops".to_string()]);
    let response = store.search(&request).await.unwrap();

    assert_eq!(response.results.len(), 1);
    let hit = &response.results[0];
    assert_eq!(hit.citation.file_path, "ops/brief.md");
    assert!(hit.score > 0.0);
    assert!(hit.citation.snippet.to_lowercase().contains("smuggling"));
    assert!(hit.text_excerpt.contains("corridor"));
}

#[tokio::test]
async fn test_tag_filter_is_case_insensitive_and_conjunctive() {
    let ws = Workspace::new();
    let store = corpus_store(&ws).await;

    let both = SearchRequest::new("smuggling", 10).with_tags(vec!["OPS".into(), "restricted".into()]);
    let hits = store.search(&both).await.unwrap().results;
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.citation.file_path == "ops/brief.md"));

    let impossible = SearchRequest::new("smuggling", 10).with_tags(vec!["ops".into(), "news".into()]);
    assert!(store.search(&impossible).await.unwrap().results.is_empty());
}

#[tokio::test]
async fn test_filters_only_narrow() {
    let ws = Workspace::new();
    let store = corpus_store(&ws).await;

    for query in ["smuggling corridor", "risk", "summer watering", "harbour boats"] {
        let all: HashSet<String> = store
            .search(&SearchRequest::new(query, 100))
            .await
            .unwrap()
            .results
            .into_iter()
            .map(|h| h.chunk_id)
            .collect();

        let by_type = store
            .search(&SearchRequest::new(query, 100).with_types(vec![FileType::Text]))
            .await
            .unwrap()
            .results;
        assert!(by_type.iter().all(|h| h.citation.file_path.ends_with(".txt")));
        assert!(by_type.iter().all(|h| all.contains(&h.chunk_id)));

        let by_tag = store
            .search(&SearchRequest::new(query, 100).with_tags(vec!["news".into()]))
            .await
            .unwrap()
            .results;
        assert!(by_tag.iter().all(|h| h.citation.file_path == "news/coast.md"));
        assert!(by_tag.iter().all(|h| all.contains(&h.chunk_id)));
    }
}

/// Load the persisted indexes so rankings can be checked independently
async fn persisted_indexes(snapshots: &MemorySnapshotStore) -> (VectorIndex, KeywordIndex) {
    let vectors = snapshots.read(Artifact::Vectors).await.unwrap().unwrap();
    let keywords = snapshots.read(Artifact::Keywords).await.unwrap().unwrap();
    (
        serde_json::from_slice(&vectors).unwrap(),
        serde_json::from_slice(&keywords).unwrap(),
    )
}

#[test]
fn prop_alpha_extremes_match_single_side_rankings() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let ws = Workspace::new();
    for (path, content) in CORPUS {
        ws.write(path, content);
    }
    let (store, snapshots) = runtime.block_on(ws.open_in_memory());
    runtime.block_on(store.index_paths(&[])).unwrap();
    let (vectors, keywords) = runtime.block_on(persisted_indexes(&snapshots));
    let embedder = HashEmbedder::new(common::DIMENSIONS);

    let vocabulary = vec![
        "smuggling", "corridor", "risk", "coast", "harbour", "summer", "shipping", "flooding",
        "boats", "winter", "tomatoes", "register",
    ];
    let queries = prop::sample::subsequence(vocabulary, 1..4).prop_map(|words| words.join(" "));

    let mut runner = TestRunner::new(ProptestConfig::with_cases(32));
    runner
        .run(&queries, |query| {
            let hit_ids = |alpha: f32| -> Vec<String> {
                runtime
                    .block_on(store.search(&SearchRequest::new(&query, 10).with_alpha(alpha)))
                    .unwrap()
                    .results
                    .into_iter()
                    .map(|h| h.chunk_id)
                    .collect()
            };

            let expected_dense: Vec<String> = vectors
                .search(&embedder.embed_sync(&query), 10, None)
                .unwrap()
                .into_iter()
                .filter(|m| m.score > -1.0)
                .map(|m| m.id)
                .collect();
            prop_assert_eq!(hit_ids(1.0), expected_dense);

            let expected_keyword: Vec<String> = keywords
                .search(&query, 10, &[], None)
                .into_iter()
                .map(|m| m.id)
                .collect();
            prop_assert_eq!(hit_ids(0.0), expected_keyword);
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn test_trivial_requests() {
    let ws = Workspace::new();
    let store = corpus_store(&ws).await;

    assert!(store
        .search(&SearchRequest::new("smuggling", 0))
        .await
        .unwrap()
        .results
        .is_empty());
    assert!(store
        .search(&SearchRequest::new("   ", 5))
        .await
        .unwrap()
        .results
        .is_empty());

    let nan = SearchRequest::new("smuggling", 5).with_alpha(f32::NAN);
    assert!(matches!(
        store.search(&nan).await,
        Err(QuarryError::InvalidInput(_))
    ));

    let clamped = store
        .search(&SearchRequest::new("smuggling", 5).with_alpha(7.0).with_explain(true))
        .await
        .unwrap();
    assert!(clamped
        .results
        .iter()
        .all(|h| h.explain.as_ref().unwrap().alpha == 1.0));
}

#[tokio::test]
async fn test_query_embeddings_are_cached() {
    let ws = Workspace::new();
    let store = corpus_store(&ws).await;
    let request = SearchRequest::new("smuggling corridor", 3);

    store.search(&request).await.unwrap();
    let before = store.stats().await.cache;
    store.search(&request).await.unwrap();
    let after = store.stats().await.cache;

    assert_eq!(after.hits, before.hits + 1);
    assert_eq!(after.query_entries, 1);
}

/// Extractor emitting paged drafts out of document order
struct ShuffledPdf;

impl Extractor for ShuffledPdf {
    fn name(&self) -> &'static str {
        "shuffled-pdf"
    }

    fn file_types(&self) -> &'static [FileType] {
        &[FileType::Pdf]
    }

    fn extract(&self, _path: &Path, _bytes: &[u8]) -> quarry_core::Result<Vec<ChunkDraft>> {
        Ok(vec![
            ChunkDraft::new("page two opening").with_page(2).with_offsets(0, 16),
            ChunkDraft::new("page one closing").with_page(1).with_offsets(40, 56),
            ChunkDraft::new("page one opening").with_page(1).with_offsets(0, 16),
        ])
    }
}

async fn paged_store(ws: &Workspace) -> KnowledgeStore {
    ws.write("scan.pdf", b"%PDF-1.4 placeholder");
    let mut registry = ExtractorRegistry::with_defaults(ChunkOptions::default());
    registry.register(Arc::new(ShuffledPdf));
    let store = KnowledgeStore::builder(ws.config())
        .snapshots(Arc::new(MemorySnapshotStore::new()))
        .embedder(Arc::new(quarry_core::HashEmbedder::new(common::DIMENSIONS)))
        .extractors(registry)
        .open()
        .await
        .unwrap();
    store.index_paths(&[]).await.unwrap();
    store
}

#[tokio::test]
async fn test_get_document_orders_chunks() {
    let ws = Workspace::new();
    let store = paged_store(&ws).await;

    let doc = store
        .get_document(&PathBuf::from("scan.pdf"), None)
        .await
        .unwrap();
    assert_eq!(
        doc.text,
        "page one opening\n\npage one closing\n\npage two opening"
    );

    let page = store
        .get_document(&ws.docs().join("scan.pdf"), Some(2))
        .await
        .unwrap();
    assert_eq!(page.page, Some(2));
    assert_eq!(page.text, "page two opening");
}

#[tokio::test]
async fn test_get_document_not_indexed() {
    let ws = Workspace::new();
    let store = paged_store(&ws).await;

    assert!(matches!(
        store.get_document(&PathBuf::from("missing.md"), None).await,
        Err(QuarryError::NotIndexed(_))
    ));
    match store.get_document(&PathBuf::from("scan.pdf"), Some(9)).await {
        Err(QuarryError::NotIndexed(target)) => assert_eq!(target, "scan.pdf page 9"),
        other => panic!("expected NotIndexed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_citations_carry_pages() {
    let ws = Workspace::new();
    let store = paged_store(&ws).await;

    let hits = store
        .search(&SearchRequest::new("closing", 1).with_alpha(0.0))
        .await
        .unwrap()
        .results;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].citation.page, Some(1));
    assert_eq!(hits[0].citation.start_offset, Some(40));
}
