//! Similarity retrieval over the vector index.
//!
//! The query is embedded with the same [`Embedder`] that built the index.
//! A dimension mismatch is reported; any other index failure degrades to
//! an empty result.

use std::sync::Arc;

use tracing::{debug, warn};

use doki_shared::{DokiError, Result, ScoredRecord};
use doki_storage::VectorIndex;

use crate::embedding::Embedder;

/// Default number of chunks returned per query.
pub const DEFAULT_K: usize = 5;

/// Read-only handle pairing an index with its embedder.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, k: usize) -> Self {
        Self { index, embedder, k }
    }

    /// Configured result count.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// The `k` most similar records to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredRecord>> {
        let vector = self.embedder.embed(query).await?;

        match self.index.query(&vector, k).await {
            Ok(results) => {
                debug!(results = results.len(), k, "retrieved chunks");
                Ok(results)
            }
            Err(e @ DokiError::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, path = %self.index.path().display(), "vector index query failed, returning no context");
                Ok(Vec::new())
            }
        }
    }

    /// [`Self::retrieve`] with the configured `k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ScoredRecord>> {
        self.retrieve(query, self.k).await
    }
}
