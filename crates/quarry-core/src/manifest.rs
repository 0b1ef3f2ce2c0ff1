//! Incremental index manifest

use crate::chunk::FileType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the store knows about one indexed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndexRecord {
    pub path: String,
    pub chunk_ids: Vec<String>,
    /// Modification time (unix millis)
    pub mtime: i64,
    pub size: u64,
    pub content_hash: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Chunk cap truncated this file
    #[serde(default)]
    pub partial: bool,
}

impl FileIndexRecord {
    /// Same content as last indexed, so nothing needs to be redone
    pub fn is_unchanged(&self, content_hash: &str, mtime: i64) -> bool {
        self.content_hash == content_hash && self.mtime == mtime
    }
}

/// Map of normalized path to index record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub files: BTreeMap<String, FileIndexRecord>,
    pub total_chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            files: BTreeMap::new(),
            total_chunk_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileIndexRecord> {
        self.files.get(path)
    }

    /// Insert or replace the record for its path
    pub fn upsert(&mut self, record: FileIndexRecord) -> Option<FileIndexRecord> {
        self.files.insert(record.path.clone(), record)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileIndexRecord> {
        self.files.remove(path)
    }

    /// Paths recorded under `root` (normalized form)
    pub fn paths_within<'a>(&'a self, root: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .keys()
            .map(String::as_str)
            .filter(move |path| crate::paths::is_within(path, root))
    }

    /// Refresh the chunk total and timestamp before persisting
    pub fn touch(&mut self, total_chunk_count: usize) {
        self.total_chunk_count = total_chunk_count;
        self.updated_at = Utc::now();
    }

    pub fn partial_count(&self) -> usize {
        self.files.values().filter(|r| r.partial).count()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}
