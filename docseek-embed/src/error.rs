//! Error types for the embedding system

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers every failure mode of the embedding boundary: the provider being
/// unreachable or failing mid-generation, invalid configuration, and the
/// plumbing around async execution. Callers that can tolerate a degraded
/// mode (the indexing pipeline) match on [`EmbedError::ProviderUnavailable`]
/// and substitute the deterministic fallback embedder; everything else
/// propagates.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding provider could not be reached or failed to serve the
    /// request (model missing, backend outage, quota exhausted).
    #[error("Embedding provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// Error when provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors when loading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a provider-unavailable error with a custom message.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }
}
