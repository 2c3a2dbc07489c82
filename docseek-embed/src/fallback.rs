//! Deterministic fallback embeddings for provider outages.
//!
//! When the real embedding provider is unreachable, indexing degrades to a
//! hash-derived embedding rather than halting. Each text maps to the same
//! vector on every call: tokens and their character trigrams are FNV-hashed
//! into a fixed-dimension accumulator with hash-derived signs, then
//! L2-normalized. The result is a crude bag-of-features vector: identical
//! texts collide exactly, texts sharing tokens land near each other, and the
//! dimension always matches the active provider's so mixed batches stay
//! valid in the same store.

use crate::error::Result;
use crate::provider::{EmbeddingBatch, EmbeddingProvider};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Deterministic hash-derived embedder. Constructed with the dimension of
/// the embedding space it must stay compatible with.
#[derive(Debug, Clone)]
pub struct FallbackEmbedder {
    dimension: usize,
}

impl FallbackEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Produce the deterministic embedding for `text`.
    pub fn embed(&self, text: &str) -> Vec<f16> {
        let mut accumulator = vec![0.0f32; self.dimension];

        for token in text.to_lowercase().split_whitespace() {
            self.fold_feature(token.as_bytes(), &mut accumulator);

            let chars: Vec<char> = token.chars().collect();
            for trigram in chars.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.fold_feature(trigram.as_bytes(), &mut accumulator);
            }
        }

        let norm: f32 = accumulator.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut accumulator {
                *value /= norm;
            }
        }

        accumulator.into_iter().map(f16::from_f32).collect()
    }

    // Hash one feature into the accumulator: the hash picks a bucket and a
    // sign, so distinct features mostly cancel rather than drift positive.
    fn fold_feature(&self, feature: &[u8], accumulator: &mut [f32]) {
        if accumulator.is_empty() {
            return;
        }
        let mut hasher = FnvHasher::default();
        hasher.write(feature);
        let hash = hasher.finish();

        let bucket = (hash % accumulator.len() as u64) as usize;
        let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        accumulator[bucket] += sign;
    }
}

#[async_trait]
impl EmbeddingProvider for FallbackEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        let embeddings = texts.iter().map(|text| self.embed(text)).collect();
        Ok(EmbeddingBatch::new(embeddings))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fallback-hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic() {
        let embedder = FallbackEmbedder::new(64);
        let a = embedder.embed("quarterly invoice for services rendered");
        let b = embedder.embed("quarterly invoice for services rendered");
        assert_eq!(a, b);
    }

    #[test]
    fn embeddings_have_requested_dimension() {
        for dimension in [8, 64, 384] {
            let embedder = FallbackEmbedder::new(dimension);
            assert_eq!(embedder.embed("some text").len(), dimension);
        }
    }

    #[test]
    fn embeddings_are_normalized() {
        let embedder = FallbackEmbedder::new(128);
        let embedding = embedder.embed("normalize me please");
        let norm: f32 = embedding.iter().map(|x| x.to_f32().powi(2)).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "norm was {norm}");
    }

    #[test]
    fn different_texts_differ() {
        let embedder = FallbackEmbedder::new(128);
        let a = embedder.embed("alpha bravo charlie");
        let b = embedder.embed("delta echo foxtrot");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_text_is_a_zero_vector() {
        let embedder = FallbackEmbedder::new(16);
        let embedding = embedder.embed("");
        assert!(embedding.iter().all(|&x| x.to_f32() == 0.0));
    }

    #[tokio::test]
    async fn provider_trait_matches_direct_calls() {
        let embedder = FallbackEmbedder::new(32);
        let direct = embedder.embed("hello world");
        let via_trait = embedder.embed_query("hello world").await.unwrap();
        assert_eq!(direct, via_trait);

        let batch = embedder
            .embed_batch(&["hello world".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, 32);
        assert_eq!(batch.embeddings[0], direct);
    }
}
