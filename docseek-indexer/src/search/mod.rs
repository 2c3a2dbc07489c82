//! Query execution: embed, retrieve, lexically re-rank, filter.
//!
//! Vector similarity alone ranks poorly when the user is really asking for
//! a file by name ("invoice_2023"), so retrieval is re-ranked with a
//! lexical signal: filename-like tokens are pulled out of the query and
//! matched against each hit's filename in tiers, from exact match down to a
//! loose substring. The tier multiplies the similarity score, clamped back
//! into `[0, 1]`.
//!
//! Metadata filters are applied *before* truncating to `top_k`. The store
//! is over-fetched when filters are present, so a filtered search still
//! fills its result budget when enough qualifying chunks exist. Each query
//! is independent and stateless.

use anyhow::{Context, Result};
use docseek_embed::EmbeddingProvider;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::indexing::extract::SUPPORTED_EXTENSIONS;
use crate::storage::{ChunkMetadata, VectorStore};

/// How far beyond `top_k` to reach into the store when filters will discard
/// some hits before truncation.
const FILTER_OVERFETCH_FACTOR: usize = 4;
const FILTER_OVERFETCH_FLOOR: usize = 50;

/// Query words that never count as filename-like tokens.
const QUERY_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "documents", "file", "files", "find", "for", "from", "in", "is",
    "me", "my", "of", "on", "or", "search", "show", "that", "the", "this", "to", "was", "what",
    "where", "with",
];

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: i64,
    pub filename: String,
    pub path: String,
    pub page: Option<u32>,
    pub text: String,
    /// Vector similarity: `1 - distance`
    pub raw_score: f32,
    /// Lexical filename multiplier, 1.0 when nothing matches
    pub boost: f32,
    /// `clamp(raw_score * boost, 0, 1)`
    pub final_score: f32,
    pub metadata: ChunkMetadata,
}

/// Metadata filters, AND-combined. An empty filter set passes everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Exact match on the file extension (without the dot)
    pub file_type: Option<String>,
    /// Substring match on the source path
    pub folder: Option<String>,
    /// Lower bound (inclusive) on the chunk's import timestamp
    pub imported_after: Option<f64>,
    /// Upper bound (inclusive) on the chunk's import timestamp
    pub imported_before: Option<f64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.file_type.is_none()
            && self.folder.is_none()
            && self.imported_after.is_none()
            && self.imported_before.is_none()
    }

    /// Parse `key=value` pairs (as supplied on the CLI). Unknown keys are
    /// ignored with a warning rather than rejected.
    pub fn parse(pairs: &[String]) -> Self {
        let mut filters = Self::default();
        for pair in pairs {
            let Some((key, value)) = pair.split_once('=') else {
                warn!("ignoring malformed filter (expected key=value): {pair}");
                continue;
            };
            match key {
                "filetype" => {
                    filters.file_type = Some(value.trim_start_matches('.').to_lowercase());
                }
                "folder" => filters.folder = Some(value.to_string()),
                "imported_after" => match value.parse() {
                    Ok(bound) => filters.imported_after = Some(bound),
                    Err(_) => warn!("ignoring non-numeric imported_after: {value}"),
                },
                "imported_before" => match value.parse() {
                    Ok(bound) => filters.imported_before = Some(bound),
                    Err(_) => warn!("ignoring non-numeric imported_before: {value}"),
                },
                other => warn!("ignoring unknown filter key: {other}"),
            }
        }
        filters
    }

    fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(file_type) = &self.file_type {
            if !metadata.file_type.eq_ignore_ascii_case(file_type) {
                return false;
            }
        }
        if let Some(folder) = &self.folder {
            if !metadata.source_path.contains(folder.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.imported_after {
            if metadata.imported_at < after {
                return false;
            }
        }
        if let Some(before) = self.imported_before {
            if metadata.imported_at > before {
                return false;
            }
        }
        true
    }
}

/// Stateless search executor over a vector store and embedding provider.
pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    filename_pattern: Regex,
    word_pattern: Regex,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let extensions = SUPPORTED_EXTENSIONS.join("|");
        let filename_pattern = Regex::new(&format!(r"(?i)\b[\w\-]+\.(?:{extensions})\b"))
            .expect("filename pattern compiles");
        let word_pattern = Regex::new(r"\w+").expect("word pattern compiles");
        Self {
            store,
            provider,
            filename_pattern,
            word_pattern,
        }
    }

    /// Execute a search: embed the query, retrieve nearest chunks, re-rank
    /// with the filename boost, filter, and truncate to `top_k`.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .provider
            .embed_query(query)
            .await
            .context("failed to embed query")?;

        let fetch_k = if filters.is_empty() {
            top_k
        } else {
            (top_k * FILTER_OVERFETCH_FACTOR).max(FILTER_OVERFETCH_FLOOR)
        };
        let raw_hits = self.store.query_top_k(&embedding, fetch_k).await?;

        let tokens = self.extract_filename_tokens(query);
        debug!("query {query:?}: {} raw hits, tokens {tokens:?}", raw_hits.len());

        let mut hits: Vec<SearchHit> = raw_hits
            .into_iter()
            .map(|hit| {
                let raw_score = 1.0 - hit.distance;
                let boost = filename_boost(&hit.metadata.filename, &tokens);
                let final_score = (raw_score * boost).clamp(0.0, 1.0);
                SearchHit {
                    chunk_id: hit.id,
                    document_id: hit.metadata.document_id,
                    filename: hit.metadata.filename.clone(),
                    path: hit.metadata.source_path.clone(),
                    page: hit.metadata.page,
                    text: hit.text,
                    raw_score,
                    boost,
                    final_score,
                    metadata: hit.metadata,
                }
            })
            .collect();

        // Stable sort: ties keep their original retrieval rank.
        hits.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        hits.retain(|hit| filters.matches(&hit.metadata));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Pull filename-like tokens out of a query: explicit `name.ext`
    /// mentions with a whitelisted extension, plus bare word tokens of 2-20
    /// characters that are not stop words. Order-preserving, deduplicated.
    fn extract_filename_tokens(&self, query: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut seen = HashSet::new();

        for mat in self.filename_pattern.find_iter(query) {
            let token = mat.as_str().to_lowercase();
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }

        for mat in self.word_pattern.find_iter(query) {
            let token = mat.as_str().to_lowercase();
            if token.len() < 2 || token.len() > 20 {
                continue;
            }
            if QUERY_STOP_WORDS.contains(&token.as_str()) {
                continue;
            }
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }

        tokens
    }
}

/// Lexical boost of a filename against the query tokens: the maximum tier
/// any token reaches. 1.0 when no token matches at all.
fn filename_boost(filename: &str, tokens: &[String]) -> f32 {
    let file_norm = normalize_name(filename);
    tokens
        .iter()
        .map(|token| token_boost(&normalize_name(token), &file_norm))
        .fold(1.0, f32::max)
}

fn token_boost(token: &str, filename: &str) -> f32 {
    if token.is_empty() || filename.is_empty() {
        return 1.0;
    }
    if token == filename {
        return 2.0;
    }

    let token_stem = strip_extension(token);
    let file_stem = strip_extension(filename);
    if !token_stem.is_empty() && token_stem == file_stem {
        return 1.8;
    }
    if !token_stem.is_empty()
        && !file_stem.is_empty()
        && (file_stem.contains(token_stem) || token_stem.contains(file_stem))
    {
        return 1.5;
    }
    if filename.contains(token) || token.contains(filename) {
        return 1.3;
    }
    1.0
}

/// Lowercase, collapse runs of whitespace, and trim.
fn normalize_name(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
