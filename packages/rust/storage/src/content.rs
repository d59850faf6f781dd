//! Filesystem content store: a flat directory of raw page bodies.
//!
//! The crawler is the only writer. Ingestion reads it back with
//! [`ContentStore::list_pages`], which yields HTML files only.

use std::path::{Path, PathBuf};

use doki_shared::{DokiError, Result};

/// A raw page read back from the store.
#[derive(Debug, Clone)]
pub struct StoredPage {
    /// File name the page was saved under.
    pub key: String,
    /// Bytes exactly as fetched.
    pub body: Vec<u8>,
}

/// Directory of raw page files keyed by file name.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `body` under `key`, replacing any previous file with that key.
    pub fn save(&self, key: &str, body: &[u8]) -> Result<PathBuf> {
        validate_key(key)?;
        std::fs::create_dir_all(&self.root).map_err(|e| DokiError::io(&self.root, e))?;

        let path = self.root.join(key);
        std::fs::write(&path, body).map_err(|e| DokiError::io(&path, e))?;
        tracing::debug!(key, bytes = body.len(), "saved page");
        Ok(path)
    }

    /// All stored `.html`/`.htm` pages, sorted by key.
    ///
    /// A missing directory is treated as an empty store.
    pub fn list_pages(&self) -> Result<Vec<StoredPage>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| DokiError::io(&self.root, e))?;

        let mut pages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DokiError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_file() || !is_html_file(&path) {
                continue;
            }
            let Some(key) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(?path, "skipping non-UTF-8 file name");
                continue;
            };
            let body = std::fs::read(&path).map_err(|e| DokiError::io(&path, e))?;
            pages.push(StoredPage {
                key: key.to_string(),
                body,
            });
        }

        pages.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(pages)
    }
}

fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Keys are single path components.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
    {
        return Err(DokiError::validation(format!(
            "invalid content store key: {key:?}"
        )));
    }
    Ok(())
}
