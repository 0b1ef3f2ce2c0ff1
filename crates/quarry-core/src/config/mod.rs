//! Configuration management

use crate::error::{QuarryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory that stored paths are made relative to
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Directory holding the persisted manifest, chunks and indexes
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Roots scanned when `index` is called without explicit paths
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Glob patterns a scanned file must match (relative to its root)
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Glob patterns excluding files from a scan
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Optional best-effort remote mirror
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            data_dir: default_data_dir(),
            roots: Vec::new(),
            include: default_include(),
            exclude: default_exclude(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            indexing: IndexingConfig::default(),
            mirror: None,
        }
    }
}

fn default_base_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("QUARRY_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::DATA_DIR_NAME)
}

fn default_include() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.*".to_string(),
    ]
}

/// Character-window chunking parameters
///
/// Both sizes are measured in UTF-8 bytes, like the chunk offsets; windows
/// are then snapped to char boundaries, so non-ASCII text gets fewer
/// characters per chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target window size in bytes
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Bytes shared between consecutive windows
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1200
}

fn default_overlap_chars() -> usize {
    150
}

/// Which embedder backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic local feature hashing, no network
    #[default]
    Hash,
    /// OpenAI-compatible `/v1/embeddings` service
    Http,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model name, also part of every embedding cache key
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base URL of the embeddings service
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Vector dimensions (hash provider uses it directly, http auto-detects if unset)
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Texts per embeddings request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            url: default_embedding_url(),
            api_key: std::env::var("QUARRY_EMBEDDING_API_KEY").ok(),
            dimensions: None,
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    std::env::var("QUARRY_EMBEDDING_MODEL").unwrap_or_else(|_| "hash-256".to_string())
}

fn default_embedding_url() -> String {
    std::env::var("QUARRY_EMBEDDING_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

fn default_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    32
}

/// Query-time parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidates requested from each sub-search before fusion
    #[serde(default = "default_fanout")]
    pub fanout: usize,

    /// Width of the citation snippet around the first query match
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Maximum length of `text_excerpt` on a hit
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fanout: default_fanout(),
            snippet_chars: default_snippet_chars(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_fanout() -> usize {
    64
}

fn default_snippet_chars() -> usize {
    240
}

fn default_excerpt_chars() -> usize {
    500
}

/// Indexing pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Files extracted and embedded concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Drop manifest entries under a scanned root whose file no longer exists
    #[serde(default = "default_true")]
    pub prune_missing: bool,

    /// Cap on chunks per file; a truncated file is marked partial
    #[serde(default)]
    pub max_chunks_per_file: Option<usize>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            prune_missing: true,
            max_chunks_per_file: None,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

/// Remote mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// SQLite database standing in for the remote store
    pub sqlite_path: PathBuf,

    /// Source namespace rows are written under
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Manifest snapshots kept after each sync
    #[serde(default = "default_retain_snapshots")]
    pub retain_snapshots: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl MirrorConfig {
    pub fn new(sqlite_path: impl Into<PathBuf>) -> Self {
        Self {
            sqlite_path: sqlite_path.into(),
            namespace: default_namespace(),
            retain_snapshots: default_retain_snapshots(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_retain_snapshots() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from an explicit path, falling back to defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Environment variables win over file values
    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("QUARRY_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("QUARRY_EMBEDDING_URL") {
            self.embedding.url = url;
            self.embedding.provider = EmbeddingProvider::Http;
        }
        if let Ok(model) = std::env::var("QUARRY_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(key) = std::env::var("QUARRY_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_chars == 0 {
            return Err(QuarryError::Config(
                "chunking.chunk_chars must be greater than 0".to_string(),
            ));
        }
        if self.chunking.overlap_chars >= self.chunking.chunk_chars {
            return Err(QuarryError::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than chunk_chars ({})",
                self.chunking.overlap_chars, self.chunking.chunk_chars
            )));
        }
        if self.search.fanout == 0 {
            return Err(QuarryError::Config(
                "search.fanout must be greater than 0".to_string(),
            ));
        }
        if self.indexing.concurrency == 0 {
            return Err(QuarryError::Config(
                "indexing.concurrency must be greater than 0".to_string(),
            ));
        }
        if self.indexing.max_chunks_per_file == Some(0) {
            return Err(QuarryError::Config(
                "indexing.max_chunks_per_file must be greater than 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(QuarryError::Config(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.embedding.dimensions == Some(0) {
            return Err(QuarryError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }
        for pattern in self.include.iter().chain(self.exclude.iter()) {
            glob::Pattern::new(pattern)?;
        }
        if let Some(mirror) = &self.mirror {
            if mirror.max_attempts == 0 {
                return Err(QuarryError::Config(
                    "mirror.max_attempts must be at least 1".to_string(),
                ));
            }
            if mirror.namespace.trim().is_empty() {
                return Err(QuarryError::Config(
                    "mirror.namespace must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
