//! docseek-indexer: semantic indexing and re-ranked search over a local
//! document collection.
//!
//! This crate keeps a vector store consistent with the files on disk and
//! answers search queries against it. Files are fingerprinted so unchanged
//! documents are never re-processed, text is split into deterministic
//! overlapping chunks, and retrieval results are re-ranked with a lexical
//! filename boost before metadata filters apply.
//!
//! ## Key Modules
//!
//! - **[`indexing`]**: fingerprinting, the extraction boundary, the
//!   document registry, and the orchestrator
//! - **[`storage`]**: the vector-store trait and its SQLite implementation
//! - **[`search`]**: the stateless query engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use docseek_embed::FallbackEmbedder;
//! use docseek_indexer::indexing::{
//!     DocumentIndex, IndexingOrchestrator, OrchestratorConfig, PlainTextExtractor,
//! };
//! use docseek_indexer::search::{QueryEngine, SearchFilters};
//! use docseek_indexer::storage::sqlite_store::SqliteVectorStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let documents = DocumentIndex::open(Path::new(".")).await?;
//! let store = Arc::new(SqliteVectorStore::new(documents.pool().clone()).await?);
//! let provider = Arc::new(FallbackEmbedder::new(384));
//!
//! let orchestrator = IndexingOrchestrator::new(
//!     documents,
//!     store.clone(),
//!     provider.clone(),
//!     Arc::new(PlainTextExtractor),
//!     OrchestratorConfig::default(),
//! );
//! orchestrator.ensure_embedding_space().await?;
//! orchestrator.import_folder(Path::new("docs"), false).await?;
//!
//! let engine = QueryEngine::new(store, provider);
//! let hits = engine.search("quarterly invoice", 10, &SearchFilters::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Fingerprint → ExtractionGateway → Chunker → Embeddings → VectorStore
//!   ↑                                                                  ↓
//! folder walk → IndexingOrchestrator → DocumentIndex          QueryEngine → hits
//! ```

pub mod indexing;
pub mod search;
pub mod storage;
