//! Configuration for embedding providers

use serde::{Deserialize, Serialize};

/// Configuration for the fastembed-backed provider.
///
/// The default points at fastembed's bundled all-MiniLM-L6-v2 model, which
/// downloads on first use and produces 384-dimensional sentence embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            batch_size: 16,
            normalize: true,
        }
    }
}

impl EmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }
}
