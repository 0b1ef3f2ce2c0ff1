//! SQLite-backed remote store

use super::{MirrorDocument, RemoteStore};
use crate::error::{QuarryError, Result};
use crate::index::{bytes_to_embedding, embedding_to_bytes};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    namespace TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    namespace TEXT NOT NULL REFERENCES sources(namespace) ON DELETE CASCADE,
    path TEXT NOT NULL,
    digest TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    file_type TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, path)
);

CREATE TABLE IF NOT EXISTS chunks (
    namespace TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    path TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    page INTEGER,
    offset_start INTEGER,
    offset_end INTEGER,
    text TEXT NOT NULL,
    embedding BLOB,
    PRIMARY KEY (namespace, chunk_id),
    FOREIGN KEY (namespace, path) REFERENCES documents(namespace, path) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(namespace, path);

CREATE TABLE IF NOT EXISTS manifest_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    taken_at TEXT NOT NULL,
    total_chunk_count INTEGER NOT NULL,
    manifest TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_namespace ON manifest_snapshots(namespace, id);
"#;

/// Remote store persisted in a SQLite database
pub struct SqliteRemoteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRemoteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| QuarryError::Mirror("connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| QuarryError::Mirror(format!("mirror task failed: {}", e)))?
    }

    /// Chunk rows stored for a namespace
    pub async fn chunk_count(&self, namespace: &str) -> Result<usize> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    /// Stored embedding for a chunk, if any
    pub async fn chunk_embedding(&self, namespace: &str, chunk_id: &str) -> Result<Option<Vec<f32>>> {
        let namespace = namespace.to_string();
        let chunk_id = chunk_id.to_string();
        self.with_conn(move |conn| {
            let blob: Option<Option<Vec<u8>>> = conn
                .query_row(
                    "SELECT embedding FROM chunks WHERE namespace = ?1 AND chunk_id = ?2",
                    params![namespace, chunk_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(blob.flatten().map(|bytes| bytes_to_embedding(&bytes)))
        })
        .await
    }

    pub async fn snapshot_count(&self, namespace: &str) -> Result<usize> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM manifest_snapshots WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn ensure_source(&self, namespace: &str) -> Result<()> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sources (namespace, created_at) VALUES (?1, ?2)",
                params![namespace, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn document_digests(&self, namespace: &str) -> Result<HashMap<String, String>> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT path, digest FROM documents WHERE namespace = ?1")?;
            let rows = stmt
                .query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<HashMap<String, String>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn replace_document(&self, namespace: &str, document: &MirrorDocument) -> Result<()> {
        let namespace = namespace.to_string();
        let document = document.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chunks WHERE namespace = ?1 AND path = ?2",
                params![namespace, document.path],
            )?;
            tx.execute(
                "INSERT INTO documents (namespace, path, digest, mtime, size, file_type, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(namespace, path) DO UPDATE SET
                    digest = excluded.digest,
                    mtime = excluded.mtime,
                    size = excluded.size,
                    file_type = excluded.file_type,
                    updated_at = excluded.updated_at",
                params![
                    namespace,
                    document.path,
                    document.digest,
                    document.mtime,
                    document.size as i64,
                    document.file_type.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT OR REPLACE INTO chunks
                     (namespace, chunk_id, path, ordinal, page, offset_start, offset_end, text, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for chunk in &document.chunks {
                    let embedding = (!chunk.embedding.is_empty())
                        .then(|| embedding_to_bytes(&chunk.embedding));
                    insert.execute(params![
                        namespace,
                        chunk.id,
                        document.path,
                        chunk.ordinal as i64,
                        chunk.page,
                        chunk.offset_start.map(|o| o as i64),
                        chunk.offset_end.map(|o| o as i64),
                        chunk.text,
                        embedding,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_documents(&self, namespace: &str, paths: &[String]) -> Result<usize> {
        let namespace = namespace.to_string();
        let paths = paths.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            for path in &paths {
                tx.execute(
                    "DELETE FROM chunks WHERE namespace = ?1 AND path = ?2",
                    params![namespace, path],
                )?;
                deleted += tx.execute(
                    "DELETE FROM documents WHERE namespace = ?1 AND path = ?2",
                    params![namespace, path],
                )?;
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    async fn record_snapshot(
        &self,
        namespace: &str,
        manifest_json: &str,
        total_chunk_count: usize,
        taken_at: DateTime<Utc>,
    ) -> Result<()> {
        let namespace = namespace.to_string();
        let manifest_json = manifest_json.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO manifest_snapshots (namespace, taken_at, total_chunk_count, manifest)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    namespace,
                    taken_at.to_rfc3339(),
                    total_chunk_count as i64,
                    manifest_json
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn prune_snapshots(&self, namespace: &str, retain: usize) -> Result<usize> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM manifest_snapshots
                 WHERE namespace = ?1 AND id NOT IN (
                    SELECT id FROM manifest_snapshots WHERE namespace = ?1
                    ORDER BY id DESC LIMIT ?2
                 )",
                params![namespace, retain as i64],
            )?;
            Ok(removed)
        })
        .await
    }
}
