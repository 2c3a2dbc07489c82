//! Storage abstraction for chunk vectors.
//!
//! The vector store is an external collaborator: the orchestrator and query
//! engine only depend on the [`VectorStore`] trait, which persists chunk
//! vectors together with their text and metadata and answers top-k
//! similarity queries. The concrete backend here is SQLite
//! ([`sqlite_store::SqliteVectorStore`]), but anything honoring the trait's
//! contract (notably: `add` upserts by id, `query_top_k` returns hits in
//! ascending distance order) can stand in.
//!
//! Distances are `1 - cosine_similarity`, so callers recover the raw
//! similarity score as `1 - distance`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod sqlite_store;

/// Identifier of a chunk in the vector store, derived deterministically
/// from the owning document's key prefix and the chunk's sequence index.
pub type ChunkKey = String;

/// Metadata stored beside each chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: i64,
    pub filename: String,
    /// Extension without the dot, lowercased
    pub file_type: String,
    pub source_path: String,
    /// Unix seconds (fractional) at which this chunk was imported
    pub imported_at: f64,
    pub chunk_index: usize,
    /// 1-based source page, when the source format is paginated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// A chunk vector plus its text and metadata, ready for insertion.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: ChunkKey,
    pub embedding: Vec<half::f16>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One similarity-query result.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: ChunkKey,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// `1 - cosine_similarity` against the query vector
    pub distance: f32,
}

/// Persistence and similarity search for chunk vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records, replacing any existing entries with the same id.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Delete entries by id, returning how many were removed.
    async fn delete(&self, ids: &[ChunkKey]) -> Result<usize>;

    /// Delete every entry belonging to `document_id`, returning how many
    /// were removed.
    async fn delete_document(&self, document_id: i64) -> Result<usize>;

    /// Return the `k` entries nearest to `embedding`, ascending by
    /// distance.
    async fn query_top_k(&self, embedding: &[half::f16], k: usize) -> Result<Vec<VectorHit>>;

    /// Total number of stored entries.
    async fn count(&self) -> Result<usize>;

    /// Number of stored entries belonging to `document_id`.
    async fn count_document(&self, document_id: i64) -> Result<usize>;

    /// Remove all entries and dimension bookkeeping.
    async fn reset(&self) -> Result<()>;

    /// The embedding dimension this store was populated with, if recorded.
    async fn stored_dimension(&self) -> Result<Option<usize>>;

    /// Record the embedding dimension the store is populated with.
    async fn record_dimension(&self, dimension: usize) -> Result<()>;
}
