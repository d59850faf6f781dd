//! Overlapping fixed-size text windows.
//!
//! Sizes are counted in characters. Every non-final chunk ends at the best
//! boundary found in the back half of its window: paragraph break, then line
//! break, then sentence end, then any whitespace, else a hard cut. The next
//! chunk starts exactly `chunk_overlap` characters before the previous end,
//! so dropping the first `chunk_overlap` characters of every chunk after the
//! first and concatenating reproduces the document.

use doki_shared::{Chunk, ChunkingConfig, Document, DokiError, Result};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DokiError::validation("chunk_size must be greater than 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DokiError::validation(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl TryFrom<&ChunkingConfig> for ChunkConfig {
    type Error = DokiError;

    fn try_from(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

/// Split every document, keeping document order and numbering chunks per source.
pub fn chunk_documents(documents: &[Document], config: &ChunkConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            chunk_text(&doc.text, config)
                .into_iter()
                .enumerate()
                .map(|(ordinal, text)| Chunk {
                    text,
                    source: doc.source.clone(),
                    ordinal,
                })
        })
        .collect()
}

/// Split one text into windows of at most `chunk_size` characters.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let size = config.chunk_size;
    let overlap = config.chunk_overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n {
        if n - start <= size {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        // The split must leave more than `overlap` characters so the next
        // start moves forward.
        let lo = (start + overlap + 1).max(start + size / 2);
        let hi = start + size;
        let end = find_split(&chars, start, lo, hi);

        chunks.push(chars[start..end].iter().collect());
        start = end - overlap;
    }
    chunks
}

/// Best split position in `lo..=hi`; the chunk is `chars[start..split]`.
fn find_split(chars: &[char], start: usize, lo: usize, hi: usize) -> usize {
    let window = || (lo..=hi).rev();

    let paragraph = window().find(|&p| p >= start + 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n');
    if let Some(p) = paragraph {
        return p;
    }

    if let Some(p) = window().find(|&p| chars[p - 1] == '\n') {
        return p;
    }

    let sentence = window().find(|&p| {
        p >= start + 2 && chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '?' | '!')
    });
    if let Some(p) = sentence {
        return p;
    }

    window().find(|&p| chars[p - 1].is_whitespace()).unwrap_or(hi)
}
