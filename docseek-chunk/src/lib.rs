pub mod split;

// Re-export the main chunking types for external use
pub use split::{Chunk, Chunker, ChunkerConfig, DEFAULT_SEPARATORS};
