//! The indexing orchestrator: keeps each document's chunk set in the vector
//! store consistent with its current content.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Files → Fingerprint check → ExtractionGateway → Chunker → Embeddings → VectorStore
//!   ↑            ↑                                              ↑            ↑
//! folder walk  DocumentIndex                        FallbackEmbedder   delete-then-insert
//! ```
//!
//! Per document the pipeline is: skip when the stored fingerprint still
//! matches (unless forced), extract text sections, chunk them, embed the
//! chunks (degrading to the deterministic fallback embedder when the
//! provider is down), then atomically replace the document's entries in the
//! vector store. Deleting before inserting is load-bearing: a re-chunk may
//! produce fewer chunks than before, and stale entries must not survive.
//!
//! Concurrency: folder imports run through a bounded worker pool
//! (`buffer_unordered` capped at `max_workers`), and a per-document async
//! mutex guarantees at most one indexing pass per document id at a time.
//! One file's failure never aborts a batch; outcomes are aggregated into an
//! [`ImportReport`].

use anyhow::{Context, Result};
use docseek_chunk::{Chunker, ChunkerConfig};
use docseek_embed::{EmbeddingProvider, FallbackEmbedder};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::document_index::{Document, DocumentIndex, IndexState};
use super::extract::{ExtractionGateway, SUPPORTED_EXTENSIONS, Section};
use super::fingerprint::{Fingerprint, needs_reindex};
use crate::storage::{ChunkMetadata, VectorRecord, VectorStore};

/// Configuration for the indexing orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum concurrent document pipelines during folder imports
    pub max_workers: usize,
    /// Chunking configuration
    pub chunker: ChunkerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            chunker: ChunkerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_chunker_config(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }
}

/// Result of importing a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Indexed,
    Skipped,
    Failed,
}

/// Aggregate counts for a batch import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportReport {
    pub processed: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportReport {
    pub fn record(&mut self, outcome: ImportOutcome) {
        self.processed += 1;
        match outcome {
            ImportOutcome::Indexed => self.indexed += 1,
            ImportOutcome::Skipped => self.skipped += 1,
            ImportOutcome::Failed => self.failed += 1,
        }
    }
}

/// Coordinates change detection, extraction, chunking, embedding, and
/// vector-store writes. See module docs for the pipeline shape.
pub struct IndexingOrchestrator {
    documents: DocumentIndex,
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    fallback: FallbackEmbedder,
    extractor: Arc<dyn ExtractionGateway>,
    chunker: Chunker,
    config: OrchestratorConfig,
    document_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexingOrchestrator {
    pub fn new(
        documents: DocumentIndex,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn ExtractionGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        let fallback = FallbackEmbedder::new(provider.dimension());
        let chunker = Chunker::with_config(config.chunker.clone());
        Self {
            documents,
            store,
            provider,
            fallback,
            extractor,
            chunker,
            config,
            document_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn documents(&self) -> &DocumentIndex {
        &self.documents
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Verify that the vector store matches the active provider's embedding
    /// space. On a dimension mismatch the store is reset and every document
    /// loses its index state; an empty store facing documents that claim to
    /// be indexed gets the same treatment. Returns `true` when a full
    /// reindex is required.
    pub async fn ensure_embedding_space(&self) -> Result<bool> {
        let provider_dimension = self.provider.dimension();

        match self.store.stored_dimension().await? {
            Some(stored) if stored == provider_dimension => {
                if self.store.count().await? == 0 && self.any_indexed().await? {
                    warn!("vector store is empty but documents claim to be indexed, rebuilding");
                    self.documents.clear_index_state().await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Some(stored) => {
                warn!(
                    "embedding dimension changed ({stored} -> {provider_dimension}), \
                     resetting vector store"
                );
                self.store.reset().await?;
                self.store.record_dimension(provider_dimension).await?;
                self.documents.clear_index_state().await?;
                Ok(true)
            }
            None => {
                self.store.record_dimension(provider_dimension).await?;
                if self.any_indexed().await? {
                    warn!("vector store lost its metadata, rebuilding");
                    self.documents.clear_index_state().await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn any_indexed(&self) -> Result<bool> {
        Ok(self
            .documents
            .list()
            .await?
            .iter()
            .any(|doc| doc.state == IndexState::Indexed))
    }

    /// Import one file: register it, skip if its fingerprint is unchanged
    /// (unless `force`), otherwise extract and index it.
    pub async fn import_single(&self, path: &Path, force: bool) -> Result<ImportOutcome> {
        let path_str = path.to_string_lossy().to_string();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path_str.as_str())
            .to_string();
        let file_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        let document = self
            .documents
            .register(&path_str, &filename, &file_type)
            .await?;

        let lock = self.document_lock(document.id);
        let _guard = lock.lock().await;

        // Reload under the lock: a concurrent pass may have just finished.
        let document = self
            .documents
            .get(document.id)
            .await?
            .with_context(|| format!("document {} disappeared", document.id))?;

        let current = match Fingerprint::compute(path).await {
            Ok(fingerprint) => Some(fingerprint),
            Err(error) => {
                warn!(
                    "fingerprinting {} failed, treating as changed: {error:#}",
                    path.display()
                );
                None
            }
        };

        if !needs_reindex(document.fingerprint.as_ref(), current.as_ref(), force) {
            debug!("skipping unchanged {}", path.display());
            return Ok(ImportOutcome::Skipped);
        }

        self.begin_indexing(document.id).await?;

        let sections = match self.extractor.extract(path).await {
            Ok(sections) => sections,
            Err(error) => {
                warn!("extraction failed for {}: {error}", path.display());
                self.documents
                    .set_state(document.id, IndexState::Failed)
                    .await?;
                return Ok(ImportOutcome::Failed);
            }
        };

        self.index_sections(&document, sections, current).await
    }

    /// Index a document from already-extracted sections. Takes the
    /// per-document lock and runs steps 1-6 of the indexing pipeline.
    pub async fn index_document(
        &self,
        document: &Document,
        sections: Vec<Section>,
    ) -> Result<ImportOutcome> {
        let lock = self.document_lock(document.id);
        let _guard = lock.lock().await;

        let fingerprint = Fingerprint::compute(Path::new(&document.path)).await.ok();
        self.begin_indexing(document.id).await?;
        self.index_sections(document, sections, fingerprint).await
    }

    // Core of the pipeline; the caller holds the document lock and has
    // moved the document into the Indexing state.
    async fn index_sections(
        &self,
        document: &Document,
        mut sections: Vec<Section>,
        fingerprint: Option<Fingerprint>,
    ) -> Result<ImportOutcome> {
        // Empty text falls back to the stored summary, then to a fresh
        // extraction.
        if total_text_len(&sections) == 0 {
            if let Some(summary) = document
                .summary
                .as_deref()
                .filter(|summary| !summary.trim().is_empty())
            {
                debug!("no extracted text for {}, using stored summary", document.path);
                sections = vec![Section::new(None, summary)];
            } else {
                match self.extractor.extract(Path::new(&document.path)).await {
                    Ok(fresh) if total_text_len(&fresh) > 0 => sections = fresh,
                    Ok(_) => {}
                    Err(error) => {
                        debug!("re-extraction of {} failed: {error}", document.path);
                    }
                }
            }
        }

        if total_text_len(&sections) == 0 {
            warn!("no text available for {}, marking failed", document.path);
            self.documents
                .set_state(document.id, IndexState::Failed)
                .await?;
            return Ok(ImportOutcome::Failed);
        }

        // Chunk every section, numbering chunks consecutively across
        // sections so each keeps a unique sequence index per document.
        let mut chunk_texts: Vec<String> = Vec::new();
        let mut chunk_pages: Vec<Option<u32>> = Vec::new();
        for section in &sections {
            for chunk in self.chunker.split(&section.text) {
                chunk_texts.push(chunk.text);
                chunk_pages.push(section.page);
            }
        }

        if chunk_texts.is_empty() {
            warn!("{} produced no chunks, skipping", document.path);
            self.documents
                .set_state(document.id, IndexState::Unindexed)
                .await?;
            return Ok(ImportOutcome::Skipped);
        }

        let embeddings = match self.provider.embed_batch(&chunk_texts).await {
            Ok(batch) if batch.len() == chunk_texts.len() => batch.embeddings,
            Ok(batch) => {
                warn!(
                    "provider returned {} embeddings for {} chunks of {}, \
                     degrading to fallback embeddings",
                    batch.len(),
                    chunk_texts.len(),
                    document.path
                );
                chunk_texts.iter().map(|text| self.fallback.embed(text)).collect()
            }
            Err(error) => {
                warn!(
                    "embedding provider failed for {} ({error}), \
                     degrading to fallback embeddings",
                    document.path
                );
                chunk_texts.iter().map(|text| self.fallback.embed(text)).collect()
            }
        };

        let now = chrono::Utc::now();
        let imported_at = now.timestamp_micros() as f64 / 1_000_000.0;

        let records: Vec<VectorRecord> = chunk_texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (text, embedding))| VectorRecord {
                id: document.chunk_key(chunk_index),
                embedding,
                text,
                metadata: ChunkMetadata {
                    document_id: document.id,
                    filename: document.filename.clone(),
                    file_type: document.file_type.clone(),
                    source_path: document.path.clone(),
                    imported_at,
                    chunk_index,
                    page: chunk_pages[chunk_index],
                },
            })
            .collect();
        let chunk_count = records.len();

        // Delete before insert: the previous version of this document may
        // have had a different chunk count, and its stale entries must not
        // survive the re-chunk.
        let removed = self.store.delete_document(document.id).await?;
        if removed > 0 {
            debug!("removed {removed} stale entries for {}", document.path);
        }

        if let Err(error) = self.store.add(records).await {
            warn!("vector store write failed for {}: {error:#}", document.path);
            self.documents
                .set_state(document.id, IndexState::Failed)
                .await?;
            return Ok(ImportOutcome::Failed);
        }

        // The fingerprint persisted here is the one taken when this pass
        // started; recompute only if that attempt failed.
        let fingerprint = match fingerprint {
            Some(fingerprint) => Some(fingerprint),
            None => Fingerprint::compute(Path::new(&document.path)).await.ok(),
        };
        self.documents
            .record_indexed(document.id, fingerprint.as_ref(), now.timestamp())
            .await?;

        info!("indexed {} ({chunk_count} chunks)", document.path);
        Ok(ImportOutcome::Indexed)
    }

    /// Recursively import every eligible file under `root` through the
    /// bounded worker pool. One file's failure never aborts the walk.
    pub async fn import_folder(&self, root: &Path, force: bool) -> Result<ImportReport> {
        let files = self.collect_eligible_files(root).await?;
        info!("importing {} files from {}", files.len(), root.display());

        let report = stream::iter(files)
            .map(|path| async move {
                match self.import_single(&path, force).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        warn!("import of {} failed: {error:#}", path.display());
                        ImportOutcome::Failed
                    }
                }
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .fold(ImportReport::default(), |mut report, outcome| async move {
                report.record(outcome);
                report
            })
            .await;

        info!(
            "import of {} finished: {} indexed, {} skipped, {} failed",
            root.display(),
            report.indexed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Re-run every registered document through the pipeline. Used after an
    /// embedding-space reset.
    pub async fn reindex_registered(&self) -> Result<ImportReport> {
        let documents = self.documents.list().await?;
        info!("reindexing {} registered documents", documents.len());

        let report = stream::iter(documents)
            .map(|document| async move {
                let path = PathBuf::from(&document.path);
                match self.import_single(&path, true).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        warn!("reindex of {} failed: {error:#}", document.path);
                        ImportOutcome::Failed
                    }
                }
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .fold(ImportReport::default(), |mut report, outcome| async move {
                report.record(outcome);
                report
            })
            .await;

        Ok(report)
    }

    /// Run a full reindex of `root` in the background, detached from the
    /// caller.
    pub fn spawn_full_reindex(
        self: &Arc<Self>,
        root: PathBuf,
    ) -> tokio::task::JoinHandle<Result<ImportReport>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.import_folder(&root, true).await })
    }

    // Move a document into Indexing, unsticking records left in Indexing
    // by an interrupted prior run.
    async fn begin_indexing(&self, id: i64) -> Result<()> {
        let state = self
            .documents
            .get(id)
            .await?
            .with_context(|| format!("unknown document id {id}"))?
            .state;

        if state == IndexState::Indexing {
            warn!("document {id} was left mid-indexing, resetting");
            self.documents.set_state(id, IndexState::Unindexed).await?;
        }
        self.documents.set_state(id, IndexState::Indexing).await
    }

    fn document_lock(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.document_locks.lock().unwrap();
        Arc::clone(locks.entry(id).or_default())
    }

    // Depth-first walk collecting files with eligible extensions, skipping
    // hidden files. Unreadable directories are logged and skipped.
    async fn collect_eligible_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir_stack = vec![root.to_path_buf()];

        while let Some(current_dir) = dir_stack.pop() {
            let mut read_dir = match tokio::fs::read_dir(&current_dir).await {
                Ok(read_dir) => read_dir,
                Err(error) => {
                    warn!("failed to read directory {}: {error}", current_dir.display());
                    continue;
                }
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(error) => {
                        warn!("failed to stat {}: {error}", path.display());
                        continue;
                    }
                };

                if metadata.is_dir() {
                    dir_stack.push(path);
                    continue;
                }

                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    if name.starts_with('.') {
                        continue;
                    }
                }

                let eligible = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false);
                if eligible {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

fn total_text_len(sections: &[Section]) -> usize {
    sections.iter().map(|section| section.text.trim().len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::extract::{PlainTextExtractor, StaticExtractor};
    use crate::storage::sqlite_store::SqliteVectorStore;
    use crate::storage::{ChunkKey, VectorHit};
    use async_trait::async_trait;
    use docseek_embed::{EmbedError, EmbeddingBatch};
    use half::f16;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    const DIMENSION: usize = 32;

    /// Provider that is always down, for exercising degraded mode.
    struct DownProvider;

    #[async_trait]
    impl EmbeddingProvider for DownProvider {
        async fn embed_query(&self, _text: &str) -> docseek_embed::Result<Vec<f16>> {
            Err(EmbedError::unavailable("provider offline"))
        }

        async fn embed_batch(&self, _texts: &[String]) -> docseek_embed::Result<EmbeddingBatch> {
            Err(EmbedError::unavailable("provider offline"))
        }

        fn dimension(&self) -> usize {
            DIMENSION
        }

        fn provider_name(&self) -> &str {
            "down"
        }
    }

    /// Store whose writes always fail, for exercising the failure path.
    struct UnwritableStore(SqliteVectorStore);

    #[async_trait]
    impl VectorStore for UnwritableStore {
        async fn add(&self, _records: Vec<VectorRecord>) -> Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }

        async fn delete(&self, ids: &[ChunkKey]) -> Result<usize> {
            self.0.delete(ids).await
        }

        async fn delete_document(&self, document_id: i64) -> Result<usize> {
            self.0.delete_document(document_id).await
        }

        async fn query_top_k(&self, embedding: &[f16], k: usize) -> Result<Vec<VectorHit>> {
            self.0.query_top_k(embedding, k).await
        }

        async fn count(&self) -> Result<usize> {
            self.0.count().await
        }

        async fn count_document(&self, document_id: i64) -> Result<usize> {
            self.0.count_document(document_id).await
        }

        async fn reset(&self) -> Result<()> {
            self.0.reset().await
        }

        async fn stored_dimension(&self) -> Result<Option<usize>> {
            self.0.stored_dimension().await
        }

        async fn record_dimension(&self, dimension: usize) -> Result<()> {
            self.0.record_dimension(dimension).await
        }
    }

    async fn orchestrator_with(extractor: Arc<dyn ExtractionGateway>) -> IndexingOrchestrator {
        let documents = DocumentIndex::open_memory().await.unwrap();
        let store = SqliteVectorStore::open_memory().await.unwrap();
        IndexingOrchestrator::new(
            documents,
            Arc::new(store),
            Arc::new(FallbackEmbedder::new(DIMENSION)),
            extractor,
            OrchestratorConfig::default().with_max_workers(2),
        )
    }

    fn prose(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| {
                format!(
                    "Paragraph {i} describes the quarterly results in enough detail \
                     to produce a retained chunk on its own terms.\n\n"
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn import_indexes_then_skips_unchanged() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, prose(6)).await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;

        let first = orchestrator.import_single(&path, false).await?;
        assert_eq!(first, ImportOutcome::Indexed);

        let document = orchestrator
            .documents()
            .get_by_path(&path.to_string_lossy())
            .await?
            .unwrap();
        assert_eq!(document.state, IndexState::Indexed);
        let stored_fingerprint = document.fingerprint.clone().unwrap();
        let count_before = orchestrator.store().count().await?;
        assert!(count_before > 0);

        let second = orchestrator.import_single(&path, false).await?;
        assert_eq!(second, ImportOutcome::Skipped);
        assert_eq!(orchestrator.store().count().await?, count_before);

        let reloaded = orchestrator
            .documents()
            .get(document.id)
            .await?
            .unwrap();
        assert_eq!(reloaded.fingerprint, Some(stored_fingerprint));
        Ok(())
    }

    #[tokio::test]
    async fn force_reimports_unchanged_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, prose(3)).await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;
        assert_eq!(
            orchestrator.import_single(&path, false).await?,
            ImportOutcome::Indexed
        );
        assert_eq!(
            orchestrator.import_single(&path, true).await?,
            ImportOutcome::Indexed
        );
        Ok(())
    }

    #[tokio::test]
    async fn rechunk_leaves_no_orphans() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shrinking.txt");
        tokio::fs::write(&path, prose(12)).await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;
        orchestrator.import_single(&path, false).await?;

        let document = orchestrator
            .documents()
            .get_by_path(&path.to_string_lossy())
            .await?
            .unwrap();
        let big_count = orchestrator.store().count_document(document.id).await?;
        assert!(big_count > 1);

        // Shrink the file to a single chunk's worth of text.
        tokio::fs::write(&path, prose(1)).await?;
        assert_eq!(
            orchestrator.import_single(&path, false).await?,
            ImportOutcome::Indexed
        );

        let small_count = orchestrator.store().count_document(document.id).await?;
        assert_eq!(small_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_file_fails_without_aborting_folder() -> Result<()> {
        let dir = tempdir()?;
        tokio::fs::write(dir.path().join("good.txt"), prose(3)).await?;
        // PlainTextExtractor declines pdf, so this one fails.
        tokio::fs::write(dir.path().join("bad.pdf"), b"%PDF-1.4").await?;
        // Hidden and ineligible files are not even considered.
        tokio::fs::write(dir.path().join(".hidden.txt"), prose(1)).await?;
        tokio::fs::write(dir.path().join("image.png"), b"binary").await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;
        let report = orchestrator.import_folder(dir.path(), false).await?;

        assert_eq!(report.processed, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);

        let failed = orchestrator
            .documents()
            .get_by_path(&dir.path().join("bad.pdf").to_string_lossy())
            .await?
            .unwrap();
        assert_eq!(failed.state, IndexState::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn folder_import_recurses_into_subdirectories() -> Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("a").join("b");
        tokio::fs::create_dir_all(&nested).await?;
        tokio::fs::write(dir.path().join("top.txt"), prose(2)).await?;
        tokio::fs::write(nested.join("deep.md"), prose(2)).await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;
        let report = orchestrator.import_folder(dir.path(), false).await?;

        assert_eq!(report.processed, 2);
        assert_eq!(report.indexed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn empty_file_is_marked_failed() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.txt");
        tokio::fs::write(&path, "").await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;
        assert_eq!(
            orchestrator.import_single(&path, false).await?,
            ImportOutcome::Failed
        );

        let document = orchestrator
            .documents()
            .get_by_path(&path.to_string_lossy())
            .await?
            .unwrap();
        assert_eq!(document.state, IndexState::Failed);
        assert!(document.fingerprint.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn empty_text_falls_back_to_stored_summary() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.txt");
        tokio::fs::write(&path, "").await?;

        let orchestrator = orchestrator_with(Arc::new(PlainTextExtractor)).await;
        let document = orchestrator
            .documents()
            .register(&path.to_string_lossy(), "empty.txt", "txt")
            .await?;
        orchestrator
            .documents()
            .set_summary(
                document.id,
                "A stored summary of the document, long enough to clear the minimum chunk length.",
            )
            .await?;
        let document = orchestrator.documents().get(document.id).await?.unwrap();

        let outcome = orchestrator.index_document(&document, Vec::new()).await?;
        assert_eq!(outcome, ImportOutcome::Indexed);
        assert_eq!(orchestrator.store().count_document(document.id).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn paged_sections_carry_page_metadata() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("scan.pdf");
        tokio::fs::write(&path, b"%PDF-1.4 fake").await?;

        let long_page = |n: u32| {
            Section::new(
                Some(n),
                format!("Page {n} holds a comfortably long paragraph of scanned text content."),
            )
        };
        let extractor = StaticExtractor::new().with_sections(
            path.clone(),
            vec![long_page(1), long_page(2), long_page(3)],
        );

        let orchestrator = orchestrator_with(Arc::new(extractor)).await;
        assert_eq!(
            orchestrator.import_single(&path, false).await?,
            ImportOutcome::Indexed
        );

        let document = orchestrator
            .documents()
            .get_by_path(&path.to_string_lossy())
            .await?
            .unwrap();
        assert_eq!(orchestrator.store().count_document(document.id).await?, 3);

        let query = FallbackEmbedder::new(DIMENSION).embed("scanned text content");
        let hits = orchestrator.store().query_top_k(&query, 10).await?;
        let mut pages: Vec<Option<u32>> = hits.iter().map(|hit| hit.metadata.page).collect();
        pages.sort();
        assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn provider_outage_degrades_to_fallback_embeddings() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, prose(3)).await?;

        let documents = DocumentIndex::open_memory().await?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open_memory().await?);
        let orchestrator = IndexingOrchestrator::new(
            documents,
            Arc::clone(&store),
            Arc::new(DownProvider),
            Arc::new(PlainTextExtractor),
            OrchestratorConfig::default(),
        );

        // Indexing still succeeds, on fallback embeddings.
        assert_eq!(
            orchestrator.import_single(&path, false).await?,
            ImportOutcome::Indexed
        );
        assert!(store.count().await? > 0);
        assert!(logs_contain("degrading to fallback embeddings"));

        // The stored vectors are the deterministic fallback ones.
        let probe = FallbackEmbedder::new(DIMENSION).embed(&prose(3));
        let hits = store.query_top_k(&probe, 1).await?;
        assert!(!hits.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn store_write_failure_marks_document_failed() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, prose(3)).await?;

        let documents = DocumentIndex::open_memory().await?;
        let store: Arc<dyn VectorStore> = Arc::new(UnwritableStore(
            SqliteVectorStore::open_memory().await?,
        ));
        let orchestrator = IndexingOrchestrator::new(
            documents.clone(),
            store,
            Arc::new(FallbackEmbedder::new(DIMENSION)),
            Arc::new(PlainTextExtractor),
            OrchestratorConfig::default(),
        );

        assert_eq!(
            orchestrator.import_single(&path, false).await?,
            ImportOutcome::Failed
        );

        let document = documents
            .get_by_path(&path.to_string_lossy())
            .await?
            .unwrap();
        assert_eq!(document.state, IndexState::Failed);
        // No fingerprint: nothing was successfully indexed.
        assert!(document.fingerprint.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dimension_change_resets_store_and_documents() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, prose(3)).await?;

        let documents = DocumentIndex::open_memory().await?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open_memory().await?);

        let orchestrator = IndexingOrchestrator::new(
            documents.clone(),
            Arc::clone(&store),
            Arc::new(FallbackEmbedder::new(8)),
            Arc::new(PlainTextExtractor),
            OrchestratorConfig::default(),
        );
        assert!(!orchestrator.ensure_embedding_space().await?);
        orchestrator.import_single(&path, false).await?;
        assert!(store.count().await? > 0);

        // Same space: nothing to rebuild.
        assert!(!orchestrator.ensure_embedding_space().await?);

        // A provider with a different dimension shows up.
        let replacement = IndexingOrchestrator::new(
            documents.clone(),
            Arc::clone(&store),
            Arc::new(FallbackEmbedder::new(16)),
            Arc::new(PlainTextExtractor),
            OrchestratorConfig::default(),
        );
        assert!(replacement.ensure_embedding_space().await?);
        assert_eq!(store.count().await?, 0);
        assert_eq!(store.stored_dimension().await?, Some(16));

        let document = documents.get_by_path(&path.to_string_lossy()).await?.unwrap();
        assert_eq!(document.state, IndexState::Unindexed);
        assert!(document.fingerprint.is_none());

        // The sweep rebuilds the store in the new space.
        let report = replacement.reindex_registered().await?;
        assert_eq!(report.indexed, 1);
        assert!(store.count().await? > 0);
        Ok(())
    }
}
