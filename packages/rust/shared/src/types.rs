//! Core domain types shared by the ingestion and chat pipelines.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ingestion types
// ---------------------------------------------------------------------------

/// A crawled resource, identified by its URL.
#[derive(Debug, Clone)]
pub struct Page {
    /// Source URL (after redirects).
    pub url: String,
    /// Raw response body, exactly as fetched.
    pub body: Vec<u8>,
    /// Declared `Content-Type` header, if any.
    pub content_type: Option<String>,
}

impl Page {
    /// Whether the declared content type indicates an HTML document.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

/// Plain text extracted from one stored page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Extracted text body (never empty).
    pub text: String,
    /// Content store key of the page this came from.
    pub source: String,
}

/// A contiguous text window of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Window text.
    pub text: String,
    /// Source document identifier.
    pub source: String,
    /// Position of this chunk within its document (0-based).
    pub ordinal: usize,
}

/// Provenance stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source document identifier.
    pub source: String,
    /// Chunk ordinal within the source document.
    pub ordinal: usize,
}

/// The unit persisted in the vector index, one per chunk.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl EmbeddingRecord {
    /// Pair a chunk with its embedding.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            text: chunk.text.clone(),
            vector,
            metadata: RecordMetadata {
                source: chunk.source.clone(),
                ordinal: chunk.ordinal,
            },
        }
    }
}

/// A record returned from a similarity query, best match first.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine similarity to the query vector (higher = better).
    pub score: f32,
}

/// Character encodings tried, in order, when decoding a stored page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "windows-1252", alias = "cp1252")]
    Windows1252,
    #[serde(rename = "iso-8859-1", alias = "latin-1", alias = "latin1")]
    Latin1,
}

// ---------------------------------------------------------------------------
// Chat types
// ---------------------------------------------------------------------------

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Human,
    Ai,
}

/// One message in the caller-supplied chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Ai,
            content: content.into(),
        }
    }
}

/// Chat endpoint request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<ChatTurn>>,
}

/// Chat endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}
