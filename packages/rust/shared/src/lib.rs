//! Shared types, error model, and configuration for Doki.
//!
//! This crate is the foundation depended on by all other Doki crates.
//! It provides:
//! - [`DokiError`]: the unified error type
//! - Domain types ([`Page`], [`Document`], [`Chunk`], [`EmbeddingRecord`], [`ChatTurn`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChunkingConfig, CrawlConfig, CrawlPoliciesConfig, EmbeddingConfig,
    EmbeddingProvider, ExtractionConfig, LlmConfig, PathsConfig, RetrievalConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    validate_api_key,
};
pub use error::{DokiError, Result};
pub use types::{
    ChatRequest, ChatResponse, ChatRole, ChatTurn, Chunk, Document, EmbeddingRecord, Page,
    RecordMetadata, ScoredRecord, TextEncoding,
};
