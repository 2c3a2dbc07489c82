//! Deterministic splitting of document text into overlapping, size-bounded
//! chunks.
//!
//! The splitter works in two passes. First, the text is recursively divided
//! into *segments* using a separator hierarchy (paragraph breaks, then line
//! breaks, then sentence ends, then spaces), so that no segment exceeds the
//! configured target size. Second, the segments are assembled back into
//! chunks: each chunk collects segments until the target size is reached,
//! and the next chunk re-starts far enough back that up to `overlap`
//! characters of trailing content are repeated between consecutive chunks.
//!
//! Because both passes are pure functions of `(text, config)`, the same
//! input always yields the same chunk sequence and count. Downstream code
//! relies on this: a chunk's identity in the vector store is derived from
//! its sequence index, so re-splitting an unchanged document must address
//! exactly the same set of chunks.
//!
//! ```
//! use docseek_chunk::Chunker;
//!
//! let chunker = Chunker::with_defaults();
//! let text = "First paragraph with enough text to keep around after trimming happens.\n\n\
//!             Second paragraph, also comfortably longer than the minimum chunk length.";
//! let chunks = chunker.split(text);
//! assert!(!chunks.is_empty());
//! assert_eq!(chunks, chunker.split(text));
//! ```

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Default separator hierarchy, ordered from most to least significant:
/// paragraph breaks, line breaks, sentence ends, then single spaces.
pub const DEFAULT_SEPARATORS: &[&str] = &[
    r"\n\s*\n",   // Paragraph breaks (blank line, possibly with whitespace)
    r"\n",        // Line breaks
    r"[.!?]\s+",  // Sentence ends
    r" ",         // Spaces
];

/// Configuration for the chunking engine.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target maximum size of the fresh (non-overlapping) content of each
    /// chunk, in bytes. A chunk may additionally carry up to `overlap`
    /// bytes repeated from its predecessor.
    pub target_size: usize,
    /// Maximum number of bytes of trailing content repeated between
    /// consecutive chunks.
    pub overlap: usize,
    /// Chunks whose trimmed text is shorter than this many characters are
    /// discarded.
    pub min_chunk_len: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_size: 750,
            overlap: 150,
            min_chunk_len: 50,
        }
    }
}

impl ChunkerConfig {
    pub fn with_target_size(mut self, target_size: usize) -> Self {
        self.target_size = target_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_min_chunk_len(mut self, min_chunk_len: usize) -> Self {
        self.min_chunk_len = min_chunk_len;
        self
    }
}

/// A single chunk produced by [`Chunker::split`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position of this chunk in the output sequence (0-indexed, assigned
    /// after the minimum-length filter).
    pub sequence: usize,
    /// The chunk text.
    pub text: String,
}

/// Splits text into overlapping chunks along a separator hierarchy.
pub struct Chunker {
    config: ChunkerConfig,
    separators: Vec<Regex>,
}

impl Chunker {
    /// Create a chunker with custom separator patterns. Patterns are
    /// applied in order, most significant first.
    pub fn new(config: ChunkerConfig, separator_patterns: &[&str]) -> Result<Self, regex::Error> {
        let separators = separator_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { config, separators })
    }

    /// Create a chunker with the default configuration and separators.
    pub fn with_defaults() -> Self {
        Self::with_config(ChunkerConfig::default())
    }

    /// Create a chunker with a custom configuration and the default
    /// separator hierarchy.
    pub fn with_config(config: ChunkerConfig) -> Self {
        Self::new(config, DEFAULT_SEPARATORS).expect("default separator patterns compile")
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks. Identical `(text, config)` inputs always
    /// produce identical output.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let segments = self.segment(text, 0, 0);
        let ranges = if segments.is_empty() {
            // Segmentation found nothing to work with; fall back to the
            // whole text as a single chunk.
            vec![0..text.len()]
        } else {
            self.assemble(&segments)
        };

        let mut chunks = Vec::new();
        for range in ranges {
            let chunk_text = &text[range];
            if chunk_text.trim().chars().count() < self.config.min_chunk_len {
                continue;
            }
            chunks.push(Chunk {
                sequence: chunks.len(),
                text: chunk_text.to_string(),
            });
        }
        chunks
    }

    // Recursively split `text` into byte ranges no longer than the target
    // size, trying each separator in order and falling back to hard
    // character splits once the hierarchy is exhausted. `offset` is the
    // byte position of `text` within the original input.
    fn segment(&self, text: &str, separator_idx: usize, offset: usize) -> Vec<Range<usize>> {
        let mut result: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return result;
        }

        if text.len() <= self.config.target_size {
            result.push(offset..offset + text.len());
            return result;
        }

        if separator_idx >= self.separators.len() {
            // No separators left: hard-split at character boundaries.
            let mut local_start = 0;
            while local_start < text.len() {
                let mut local_end = (local_start + self.config.target_size).min(text.len());
                while !text.is_char_boundary(local_end) {
                    local_end -= 1;
                }
                if local_end <= local_start {
                    // Target smaller than one character; take the character.
                    local_end = text[local_start..]
                        .chars()
                        .next()
                        .map(|c| local_start + c.len_utf8())
                        .unwrap_or(text.len());
                }
                result.push(offset + local_start..offset + local_end);
                local_start = local_end;
            }
            return result;
        }

        let separator = &self.separators[separator_idx];
        let mut local_start = 0;

        for mat in separator.find_iter(text) {
            if mat.start() > local_start {
                result.extend(self.segment(
                    &text[local_start..mat.start()],
                    separator_idx + 1,
                    offset + local_start,
                ));
            }
            // The separator itself is kept as a segment so that chunk
            // boundaries never drop content.
            result.push(offset + mat.start()..offset + mat.end());
            local_start = mat.end();
        }

        if local_start < text.len() {
            result.extend(self.segment(
                &text[local_start..],
                separator_idx + 1,
                offset + local_start,
            ));
        }

        result
    }

    // Assemble segments into chunk ranges. A chunk closes once its fresh
    // content (content not repeated from the previous chunk) would exceed
    // the target size; the next chunk then re-starts at the earliest
    // segment boundary within `overlap` bytes of the close point.
    fn assemble(&self, segments: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        let mut start = segments[0].start;
        let mut fresh_start = start;
        let mut end = start;
        let mut boundaries: Vec<usize> = Vec::new();

        for segment in segments {
            if segment.end - fresh_start > self.config.target_size && end > start {
                ranges.push(start..end);
                let overlap_start = boundaries
                    .iter()
                    .copied()
                    .find(|&boundary| end - boundary <= self.config.overlap)
                    .unwrap_or(end);
                fresh_start = end;
                start = overlap_start;
                boundaries.clear();
            }
            boundaries.push(segment.start);
            end = segment.end;
        }

        if end > start {
            ranges.push(start..end);
        }
        ranges
    }
}
