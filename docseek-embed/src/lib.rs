//! # docseek-embed
//!
//! The embedding boundary for docseek: a provider trait that maps text to
//! fixed-dimension `f16` vectors, a fastembed-backed implementation running
//! local ONNX models, and a deterministic hash-derived fallback embedder
//! used when the provider is unavailable.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docseek_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let query = provider.embed_query("project kickoff notes").await?;
//! assert_eq!(query.len(), provider.dimension());
//!
//! let texts = vec!["first chunk".to_string(), "second chunk".to_string()];
//! let batch = provider.embed_batch(&texts).await?;
//! println!("embedded {} chunks at dimension {}", batch.len(), batch.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Degraded mode
//!
//! [`FallbackEmbedder`] produces the same vector for the same text on every
//! call, at any requested dimension. The indexing pipeline substitutes it
//! per-chunk when the provider errors, so an outage degrades retrieval
//! quality instead of halting imports.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`]
//! type; provider outages surface as [`EmbedError::ProviderUnavailable`].

pub mod config;
pub mod error;
pub mod fallback;
pub mod provider;

// Re-export main types for easy access
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use fallback::FallbackEmbedder;
pub use provider::{EmbeddingBatch, EmbeddingProvider, FastEmbedProvider};
