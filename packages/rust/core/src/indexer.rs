//! Embedding indexer: chunks in, a rebuilt vector index out.

use tracing::{debug, instrument};

use doki_shared::{Chunk, DokiError, EmbeddingRecord, Result};
use doki_storage::{IndexStats, VectorIndex};

use crate::embedding::Embedder;
use crate::ingest::ProgressReporter;

/// Embed every chunk and replace the contents of `index` with the result.
///
/// All vectors are computed before the index is touched, so an embedding
/// failure leaves the previous index intact.
#[instrument(skip_all, fields(chunks = chunks.len(), model = embedder.model_id()))]
pub async fn build_index(
    index: &VectorIndex,
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    batch_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<IndexStats> {
    let total = chunks.len();
    let mut records = Vec::with_capacity(total);

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(DokiError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            )));
        }

        records.extend(
            batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddingRecord::from_chunk(chunk, vector)),
        );
        progress.chunks_embedded(records.len(), total);
        debug!(done = records.len(), total, "embedded batch");
    }

    index.replace_all(&records, embedder.model_id()).await
}
