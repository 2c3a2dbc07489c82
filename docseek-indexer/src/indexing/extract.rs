//! The text-extraction boundary.
//!
//! Extraction is an external collaborator: the indexing pipeline only cares
//! that a file path turns into a sequence of text [`Section`]s or a typed
//! [`ExtractError`]. Paginated formats yield one section per page so that
//! every chunk can carry its source page; flat formats yield a single
//! section with `page: None`.
//!
//! [`PlainTextExtractor`] is the default gateway. It handles plain-text
//! formats in-process (UTF-8 with a lossy fallback for other encodings) and
//! reports binary document formats as unsupported; a real PDF/DOCX parser
//! plugs in behind the same trait. [`StaticExtractor`] serves canned
//! sections for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File extensions eligible for import.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

/// A contiguous stretch of extracted text, optionally tied to a source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// 1-based page number for paginated formats, `None` for flat formats.
    pub page: Option<u32>,
    pub text: String,
}

impl Section {
    pub fn new(page: Option<u32>, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// Errors at the extraction boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The file's type is not handled by this gateway.
    #[error("unsupported file type: .{extension}")]
    UnsupportedType { extension: String },

    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its content could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// The extraction seam between the filesystem and the indexing pipeline.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    /// Extract text sections from the file at `path`.
    async fn extract(&self, path: &Path) -> Result<Vec<Section>, ExtractError>;
}

/// Default gateway: reads plain-text formats directly, declines the rest.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl ExtractionGateway for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<Section>, ExtractError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "txt" | "md" => {
                let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                // Prefer strict UTF-8; fall back to lossy decoding for files
                // saved in legacy encodings.
                let text = match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(
                            "{} is not valid UTF-8, decoding lossily",
                            path.display()
                        );
                        String::from_utf8_lossy(err.as_bytes()).into_owned()
                    }
                };
                Ok(vec![Section::new(None, text)])
            }
            other => Err(ExtractError::UnsupportedType {
                extension: other.to_string(),
            }),
        }
    }
}

/// A gateway serving canned sections keyed by path, for exercising the
/// pipeline without real document parsers.
#[derive(Debug, Default)]
pub struct StaticExtractor {
    sections: HashMap<PathBuf, Vec<Section>>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sections(mut self, path: impl Into<PathBuf>, sections: Vec<Section>) -> Self {
        self.sections.insert(path.into(), sections);
        self
    }
}

#[async_trait]
impl ExtractionGateway for StaticExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<Section>, ExtractError> {
        self.sections.get(path).cloned().ok_or_else(|| {
            ExtractError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no canned sections"),
            }
        })
    }
}
