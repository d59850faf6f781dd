//! Core pipelines for Doki.
//!
//! Offline: stored pages are extracted, chunked, embedded and written to the
//! vector index ([`ingest()`]). Online: a question plus chat history is
//! reformulated, matched against the index and answered by a language model
//! ([`ChatPipeline`]).

pub mod chat;
pub mod chunker;
pub mod embedding;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod reformulate;
pub mod retriever;
pub mod synthesize;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{Answer, ChatPipeline, FALLBACK_ANSWER};
pub use chunker::{ChunkConfig, chunk_documents, chunk_text};
pub use embedding::{Embedder, HashingEmbedder, OpenAiEmbedder, build_embedder};
pub use indexer::build_index;
pub use ingest::{IngestConfig, IngestReport, ProgressReporter, SilentProgress, ingest};
pub use llm::{ChatMessage, LanguageModel, OpenAiCompatibleChat, Role, build_llm};
pub use reformulate::{reformulate, reformulation_messages};
pub use retriever::{DEFAULT_K, Retriever};
pub use synthesize::{build_prompt, synthesize};
