//! The indexing side of docseek: change detection, the extraction boundary,
//! the document registry, and the orchestrator that ties them to the vector
//! store.

pub mod document_index;
pub mod extract;
pub mod fingerprint;
pub mod orchestrator;

pub use document_index::{Document, DocumentIndex, IndexState};
pub use extract::{ExtractError, ExtractionGateway, PlainTextExtractor, Section};
pub use fingerprint::{Fingerprint, needs_reindex};
pub use orchestrator::{
    ImportOutcome, ImportReport, IndexingOrchestrator, OrchestratorConfig,
};
