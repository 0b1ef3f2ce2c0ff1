//! Quarry Core Library
//!
//! Local-first hybrid retrieval over a directory of documents.
//!
//! # Features
//! - Incremental indexing keyed by content hash and mtime
//! - Markdown, plain text, PDF, Word and Pages extraction
//! - Brute-force cosine vector index and BM25 keyword index
//! - Alpha-weighted hybrid ranking with citations
//! - Atomic snapshot persistence and an optional SQLite mirror

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod manifest;
pub mod mirror;
pub mod paths;
pub mod persist;
pub mod scan;
pub mod search;
pub mod store;

pub use chunk::{Chunk, ChunkDraft, FileType};
pub use config::{Config, EmbeddingConfig, EmbeddingProvider, MirrorConfig};
pub use embedding::{Embedder, EmbeddingCache, HashEmbedder, HttpEmbedder};
pub use error::{QuarryError, Result};
pub use extract::{Extractor, ExtractorRegistry};
pub use manifest::{FileIndexRecord, Manifest};
pub use mirror::{MemoryRemoteStore, MirrorReport, RemoteStore, SqliteRemoteStore};
pub use persist::{Artifact, FsSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use search::{Citation, SearchFilters, SearchHit, SearchRequest, SearchResponse};
pub use store::{
    Document, IndexFailure, IndexSummary, KnowledgeStore, KnowledgeStoreBuilder, StoreStats,
};

/// Default data directory name
pub const DATA_DIR_NAME: &str = "quarry";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "quarry";
