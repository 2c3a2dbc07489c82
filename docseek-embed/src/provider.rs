//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::sync::{Arc, Mutex};

/// Result of batch embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingBatch {
    /// Create a new batch from a vector of f16 embeddings. The dimension is
    /// inferred from the first embedding vector, defaulting to 0 when empty.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this batch.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this batch contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that turn text into fixed-dimension vectors.
///
/// The two operations are deliberately distinct: `embed_query` takes a single
/// text and `embed_batch` a slice, each with a fixed signature. Queries and
/// indexed chunks must be embedded by the same provider so that they live in
/// the same vector space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single query text
    async fn embed_query(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch>;

    /// Get the dimension of embeddings produced by this provider
    fn dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// FastEmbed-based embedding provider using local ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load the embedding model and probe its dimension. The model loads in
    /// a blocking task since ONNX initialization is CPU-bound.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        tracing::info!("Loading embedding model: {}", config.model_name);

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_show_download_progress(false);

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::unavailable(e.to_string()))?;

                // Probe the dimension with a test embedding
                let test_embeddings = model
                    .embed(vec!["test".to_string()], None)
                    .map_err(|e| EmbedError::unavailable(e.to_string()))?;
                let dimension = test_embeddings.first().map(|emb| emb.len()).unwrap_or(384);

                Ok((model, dimension))
            })
            .await??;

        tracing::info!("Embedding model loaded, dimension: {dimension}");

        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    /// Convert f32 embeddings to f16, normalizing if configured
    fn convert_to_f16(&self, embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                let mut f16_embedding: Vec<f16> =
                    embedding.into_iter().map(f16::from_f32).collect();

                if self.config.normalize {
                    let norm: f32 = f16_embedding
                        .iter()
                        .map(|x| x.to_f32() * x.to_f32())
                        .sum::<f32>()
                        .sqrt();
                    if norm > 0.0 {
                        for value in &mut f16_embedding {
                            *value = f16::from_f32(value.to_f32() / norm);
                        }
                    }
                }

                f16_embedding
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_batch(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::unavailable("no embedding generated for query"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::new();

        for batch in texts.chunks(self.config.batch_size) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model_guard = model
                    .lock()
                    .map_err(|_| EmbedError::unavailable("embedding model lock poisoned"))?;
                model_guard
                    .embed(batch, None)
                    .map_err(|e| EmbedError::unavailable(e.to_string()))
            })
            .await??;

            all_embeddings.extend(self.convert_to_f16(batch_embeddings));
        }

        Ok(EmbeddingBatch::new(all_embeddings))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_batch() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let batch = EmbeddingBatch::new(embeddings);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, 3);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let batch = EmbeddingBatch::new(vec![]);
        assert!(batch.is_empty());
        assert_eq!(batch.dimension, 0);
    }

    #[tokio::test]
    #[ignore] // Integration test: downloads the real MiniLM model - run with: cargo test test_fastembed_roundtrip -- --ignored
    async fn test_fastembed_roundtrip() -> Result<()> {
        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.dimension(), 384);

        let embedding = provider.embed_query("semantic search over documents").await?;
        assert_eq!(embedding.len(), provider.dimension());
        assert!(embedding.iter().any(|&x| x.to_f32() != 0.0));
        assert!(embedding.iter().all(|&x| x.to_f32().is_finite()));

        let texts = vec![
            "An invoice from the accounting department.".to_string(),
            "Meeting notes from the quarterly review.".to_string(),
        ];
        let batch = provider.embed_batch(&texts).await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, provider.dimension());

        Ok(())
    }
}
