//! Capability interfaces for the two external collaborators: building a
//! queryable index from a PDF, and answering a question against it.
//!
//! The lifecycle in [`crate::service`] only talks to these traits, so the
//! retrieval engine or the language model can be swapped (or mocked) without
//! touching session handling.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::session::ChatTurn;

/// A ranked piece of document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    /// Zero-based chunk position in the document.
    pub position: usize,
    pub text: String,
    /// Lower is better (BM25 rank); `0.0` for unranked fallback passages.
    pub score: f64,
}

/// A document that can be searched for passages.
pub trait DocumentIndex: Send + Sync {
    /// Return up to `limit` passages relevant to `query`, best first.
    fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Passage>>;

    fn chunk_count(&self) -> usize;

    /// The file this index was built from.
    fn source(&self) -> &Path;
}

/// Shared handle to the active document index.
pub type IndexHandle = Arc<dyn DocumentIndex>;

/// Builds an index from a stored PDF.
///
/// Building is atomic from the caller's view: an error means no index.
#[async_trait]
pub trait DocumentIndexer: Send + Sync {
    async fn build(&self, path: &Path) -> anyhow::Result<IndexHandle>;
}

/// Produces an answer for a question about the indexed document.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// `history` holds the prior turns of this document's conversation,
    /// oldest first, always in user/assistant pairs.
    async fn answer(
        &self,
        index: &dyn DocumentIndex,
        question: &str,
        history: &[ChatTurn],
    ) -> anyhow::Result<String>;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
