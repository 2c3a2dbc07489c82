//! SQLite registry for document records.
//!
//! This module is the durable source of truth for what the indexer knows
//! about each file: its path, type, the fingerprint recorded at the last
//! *successful* indexing, its index state, and the key prefix under which
//! its chunks live in the vector store.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     path TEXT UNIQUE NOT NULL,        -- absolute or root-relative path
//!     filename TEXT NOT NULL,
//!     file_type TEXT NOT NULL,          -- extension without the dot
//!     summary TEXT,                     -- optional stored summary
//!     size INTEGER,                     -- fingerprint: file size
//!     modified_at REAL,                 -- fingerprint: mtime (unix seconds)
//!     content_hash TEXT,                -- fingerprint: blake3 hex
//!     state TEXT NOT NULL,              -- unindexed/indexing/indexed/failed
//!     last_indexed_at INTEGER,          -- unix seconds
//!     embedding_key_prefix TEXT NOT NULL
//! );
//! ```
//!
//! The three fingerprint columns are written together on successful
//! indexing and are either all present or all NULL. Index state only moves
//! along `Unindexed → Indexing → Indexed`, regressing to `Failed` or
//! `Unindexed` on error; [`DocumentIndex::set_state`] rejects transitions
//! that would skip a state.

use anyhow::{Result, anyhow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::fingerprint::Fingerprint;

/// Lifecycle state of a document in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unindexed,
    Indexing,
    Indexed,
    Failed,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Unindexed => "unindexed",
            IndexState::Indexing => "indexing",
            IndexState::Indexed => "indexed",
            IndexState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "unindexed" => Ok(IndexState::Unindexed),
            "indexing" => Ok(IndexState::Indexing),
            "indexed" => Ok(IndexState::Indexed),
            "failed" => Ok(IndexState::Failed),
            other => Err(anyhow!("unknown index state: {other}")),
        }
    }

    /// Whether moving from `self` to `next` is a legal transition. Indexing
    /// always starts from a settled state and settles back into exactly one
    /// of the terminal states; nothing skips the `Indexing` step.
    pub fn can_transition_to(&self, next: IndexState) -> bool {
        use IndexState::*;
        matches!(
            (self, next),
            (Unindexed, Indexing)
                | (Indexed, Indexing)
                | (Failed, Indexing)
                | (Failed, Unindexed)
                | (Indexing, Indexed)
                | (Indexing, Failed)
                | (Indexing, Unindexed)
        )
    }
}

/// A document known to the indexer.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub filename: String,
    /// Extension without the dot, lowercased (e.g. "pdf")
    pub file_type: String,
    /// Optional stored summary, used as an indexing fallback when fresh
    /// extraction yields nothing
    pub summary: Option<String>,
    /// Fingerprint at the time of last successful indexing
    pub fingerprint: Option<Fingerprint>,
    pub state: IndexState,
    /// Unix seconds of the last successful indexing
    pub last_indexed_at: Option<i64>,
    /// Prefix for this document's chunk keys in the vector store
    pub embedding_key_prefix: String,
}

impl Document {
    /// Vector-store key for this document's chunk at `chunk_index`. Chunk
    /// identity is a pure function of (document, sequence index) so a
    /// re-index addresses exactly the prior set.
    pub fn chunk_key(&self, chunk_index: usize) -> String {
        format!("{}:{}", self.embedding_key_prefix, chunk_index)
    }
}

/// SQLite-backed registry of documents.
#[derive(Clone, Debug)]
pub struct DocumentIndex {
    pool: SqlitePool,
}

impl DocumentIndex {
    /// Open (creating if missing) the registry database under `base`.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = base.join(".docseek.db");

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory registry for testing. The pool is capped at one
    /// connection: every pooled connection to `sqlite::memory:` would
    /// otherwise get its own private database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                summary TEXT,
                size INTEGER,
                modified_at REAL,
                content_hash TEXT,
                state TEXT NOT NULL DEFAULT 'unindexed',
                last_indexed_at INTEGER,
                embedding_key_prefix TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_state ON documents(state)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Register a file, or return the existing record when the path is
    /// already known. The embedding key prefix is derived from the row id.
    pub async fn register(&self, path: &str, filename: &str, file_type: &str) -> Result<Document> {
        if let Some(existing) = self.get_by_path(path).await? {
            return Ok(existing);
        }

        let result = sqlx::query(
            "INSERT INTO documents (path, filename, file_type) VALUES (?1, ?2, ?3)",
        )
        .bind(path)
        .bind(filename)
        .bind(file_type)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        let prefix = format!("doc-{id}");
        sqlx::query("UPDATE documents SET embedding_key_prefix = ?1 WHERE id = ?2")
            .bind(&prefix)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow!("document {id} vanished after insert"))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::decode_row).transpose()
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::decode_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::decode_row).collect()
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Move a document to `next`, validating the transition against the
    /// state machine.
    pub async fn set_state(&self, id: i64, next: IndexState) -> Result<()> {
        let document = self
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("unknown document id {id}"))?;

        if !document.state.can_transition_to(next) {
            return Err(anyhow!(
                "invalid index state transition for document {id}: {} -> {}",
                document.state.as_str(),
                next.as_str()
            ));
        }

        sqlx::query("UPDATE documents SET state = ?1 WHERE id = ?2")
            .bind(next.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a successful indexing pass: state becomes `Indexed` and the
    /// fingerprint taken at the start of the pass is persisted with the
    /// completion timestamp.
    pub async fn record_indexed(
        &self,
        id: i64,
        fingerprint: Option<&Fingerprint>,
        indexed_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET state = 'indexed',
                size = ?1,
                modified_at = ?2,
                content_hash = ?3,
                last_indexed_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(fingerprint.map(|f| f.size as i64))
        .bind(fingerprint.map(|f| f.modified_at))
        .bind(fingerprint.map(|f| f.content_hash.as_str()))
        .bind(indexed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_summary(&self, id: i64, summary: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET summary = ?1 WHERE id = ?2")
            .bind(summary)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop all index state: every document becomes `Unindexed` with no
    /// fingerprint. Used when the embedding space changes and the vector
    /// store is rebuilt from scratch.
    pub async fn clear_index_state(&self) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET state = 'unindexed',
                size = NULL,
                modified_at = NULL,
                content_hash = NULL,
                last_indexed_at = NULL
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode_row(row: sqlx::sqlite::SqliteRow) -> Result<Document> {
        let size: Option<i64> = row.get("size");
        let modified_at: Option<f64> = row.get("modified_at");
        let content_hash: Option<String> = row.get("content_hash");

        let fingerprint = match (size, modified_at, content_hash) {
            (Some(size), Some(modified_at), Some(content_hash)) => Some(Fingerprint {
                size: size as u64,
                modified_at,
                content_hash,
            }),
            _ => None,
        };

        let state: String = row.get("state");

        Ok(Document {
            id: row.get("id"),
            path: row.get("path"),
            filename: row.get("filename"),
            file_type: row.get("file_type"),
            summary: row.get("summary"),
            fingerprint,
            state: IndexState::parse(&state)?,
            last_indexed_at: row.get("last_indexed_at"),
            embedding_key_prefix: row.get("embedding_key_prefix"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_reload() -> Result<()> {
        let index = DocumentIndex::open_memory().await?;

        let doc = index
            .register("/docs/report.pdf", "report.pdf", "pdf")
            .await?;
        assert_eq!(doc.filename, "report.pdf");
        assert_eq!(doc.state, IndexState::Unindexed);
        assert_eq!(doc.embedding_key_prefix, format!("doc-{}", doc.id));
        assert!(doc.fingerprint.is_none());

        // Registering the same path again returns the existing record
        let again = index
            .register("/docs/report.pdf", "report.pdf", "pdf")
            .await?;
        assert_eq!(again.id, doc.id);
        assert_eq!(index.count().await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn chunk_keys_are_deterministic() -> Result<()> {
        let index = DocumentIndex::open_memory().await?;
        let doc = index.register("/docs/a.txt", "a.txt", "txt").await?;

        assert_eq!(doc.chunk_key(0), format!("doc-{}:0", doc.id));
        assert_eq!(doc.chunk_key(7), format!("doc-{}:7", doc.id));
        Ok(())
    }

    #[tokio::test]
    async fn state_machine_rejects_skips() -> Result<()> {
        let index = DocumentIndex::open_memory().await?;
        let doc = index.register("/docs/a.txt", "a.txt", "txt").await?;

        // Unindexed -> Indexed skips the Indexing state
        assert!(index.set_state(doc.id, IndexState::Indexed).await.is_err());

        index.set_state(doc.id, IndexState::Indexing).await?;
        index.set_state(doc.id, IndexState::Indexed).await?;

        let reloaded = index.get(doc.id).await?.unwrap();
        assert_eq!(reloaded.state, IndexState::Indexed);

        // Indexed -> Failed is not a legal transition either
        assert!(index.set_state(doc.id, IndexState::Failed).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn record_indexed_persists_fingerprint() -> Result<()> {
        let index = DocumentIndex::open_memory().await?;
        let doc = index.register("/docs/a.txt", "a.txt", "txt").await?;

        let fingerprint = Fingerprint {
            size: 42,
            modified_at: 1_700_000_000.25,
            content_hash: "cafe".repeat(16),
        };
        index.set_state(doc.id, IndexState::Indexing).await?;
        index
            .record_indexed(doc.id, Some(&fingerprint), 1_700_000_100)
            .await?;

        let reloaded = index.get(doc.id).await?.unwrap();
        assert_eq!(reloaded.state, IndexState::Indexed);
        assert_eq!(reloaded.fingerprint, Some(fingerprint));
        assert_eq!(reloaded.last_indexed_at, Some(1_700_000_100));
        Ok(())
    }

    #[tokio::test]
    async fn clear_index_state_resets_everything() -> Result<()> {
        let index = DocumentIndex::open_memory().await?;
        let doc = index.register("/docs/a.txt", "a.txt", "txt").await?;

        let fingerprint = Fingerprint {
            size: 1,
            modified_at: 2.0,
            content_hash: "00".repeat(32),
        };
        index.set_state(doc.id, IndexState::Indexing).await?;
        index.record_indexed(doc.id, Some(&fingerprint), 3).await?;

        index.clear_index_state().await?;

        let reloaded = index.get(doc.id).await?.unwrap();
        assert_eq!(reloaded.state, IndexState::Unindexed);
        assert!(reloaded.fingerprint.is_none());
        assert!(reloaded.last_indexed_at.is_none());
        Ok(())
    }
}
