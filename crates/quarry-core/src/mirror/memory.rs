//! In-process remote store with an availability switch

use super::{MirrorDocument, RemoteStore};
use crate::error::{QuarryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    sources: BTreeSet<String>,
    documents: BTreeMap<(String, String), MirrorDocument>,
    snapshots: Vec<(String, DateTime<Utc>, usize, String)>,
}

/// Remote store kept in memory, used for tests and dry runs
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
    available: AtomicBool,
    replace_calls: AtomicUsize,
    failed_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
            replace_calls: AtomicUsize::new(0),
            failed_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate the remote going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `replace_document` calls that reached the store
    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    /// Number of calls rejected while unavailable
    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    pub fn document_paths(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .documents
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn document(&self, namespace: &str, path: &str) -> Option<MirrorDocument> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .documents
            .get(&(namespace.to_string(), path.to_string()))
            .cloned()
    }

    pub fn snapshot_count(&self, namespace: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.snapshots.iter().filter(|s| s.0 == namespace).count()
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            Err(QuarryError::Mirror("remote store unavailable".to_string()))
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn ensure_source(&self, namespace: &str) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sources.insert(namespace.to_string());
        Ok(())
    }

    async fn document_digests(&self, namespace: &str) -> Result<HashMap<String, String>> {
        self.check()?;
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .documents
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, path), doc)| (path.clone(), doc.digest.clone()))
            .collect())
    }

    async fn replace_document(&self, namespace: &str, document: &MirrorDocument) -> Result<()> {
        self.check()?;
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.documents.insert(
            (namespace.to_string(), document.path.clone()),
            document.clone(),
        );
        Ok(())
    }

    async fn delete_documents(&self, namespace: &str, paths: &[String]) -> Result<usize> {
        self.check()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(paths
            .iter()
            .filter(|path| {
                state
                    .documents
                    .remove(&(namespace.to_string(), path.to_string()))
                    .is_some()
            })
            .count())
    }

    async fn record_snapshot(
        &self,
        namespace: &str,
        manifest_json: &str,
        total_chunk_count: usize,
        taken_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.snapshots.push((
            namespace.to_string(),
            taken_at,
            total_chunk_count,
            manifest_json.to_string(),
        ));
        Ok(())
    }

    async fn prune_snapshots(&self, namespace: &str, retain: usize) -> Result<usize> {
        self.check()?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let total = state.snapshots.iter().filter(|s| s.0 == namespace).count();
        let excess = total.saturating_sub(retain);
        let mut dropped = 0;
        state.snapshots.retain(|s| {
            if s.0 == namespace && dropped < excess {
                dropped += 1;
                false
            } else {
                true
            }
        });
        Ok(dropped)
    }
}
