//! SQLite implementation of the vector store.
//!
//! Chunk vectors are stored as f16 blobs (via `bytemuck` casts) in a single
//! `vectors` table; metadata rides along as JSON. Similarity queries scan
//! the table and rank by cosine similarity in-process, sized for a personal
//! document collection rather than a dedicated vector database. The store
//! shares the registry's SQLite file.
//!
//! A one-row `vector_meta` table records the embedding dimension the store
//! was populated with, so startup can detect a provider change and trigger
//! a rebuild before mixed-dimension vectors ever coexist.

use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use super::{ChunkKey, ChunkMetadata, VectorHit, VectorRecord, VectorStore};

/// SQLite-backed vector store. See module docs for layout and trade-offs.
#[derive(Clone, Debug)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Create the store on an existing pool (typically shared with the
    /// document registry), creating tables if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an isolated in-memory store for testing. The pool is capped at
    /// one connection: every pooled connection to `sqlite::memory:` would
    /// otherwise get its own private database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new(pool).await
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                document_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_document ON vectors(document_id)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in &records {
            let embedding_bytes = bytemuck::cast_slice::<f16, u8>(&record.embedding);
            let metadata_json = serde_json::to_string(&record.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO vectors (id, document_id, chunk_index, text, embedding, metadata_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&record.id)
            .bind(record.metadata.document_id)
            .bind(record.metadata.chunk_index as i64)
            .bind(&record.text)
            .bind(embedding_bytes)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, ids: &[ChunkKey]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let query = format!("DELETE FROM vectors WHERE id IN ({placeholders})");
        let mut query_builder = sqlx::query(&query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }

        let result = query_builder.execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_document(&self, document_id: i64) -> Result<usize> {
        let result = sqlx::query("DELETE FROM vectors WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query_top_k(&self, embedding: &[f16], k: usize) -> Result<Vec<VectorHit>> {
        let rows = sqlx::query("SELECT id, text, embedding, metadata_json FROM vectors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<VectorHit> = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let text: String = row.get("text");
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");

            let stored: Vec<f16> = bytemuck::cast_slice::<u8, f16>(&embedding_bytes).to_vec();
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;

            let similarity = cosine_similarity(embedding, &stored);
            hits.push(VectorHit {
                id,
                text,
                metadata,
                distance: 1.0 - similarity,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn count_document(&self, document_id: i64) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE document_id = ?1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM vectors").execute(&self.pool).await?;
        sqlx::query("DELETE FROM vector_meta")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stored_dimension(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM vector_meta WHERE key = 'embedding_dimension'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn record_dimension(&self, dimension: usize) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vector_meta (key, value) VALUES ('embedding_dimension', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(dimension.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Cosine similarity between two f16 vectors; 0.0 for mismatched lengths or
/// zero vectors.
fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
