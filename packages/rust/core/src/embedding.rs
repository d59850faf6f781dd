//! Embedding capability and its providers.
//!
//! The same [`Embedder`] (same model id) must be used to build an index and
//! to query it; the model id is recorded in the index for that check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use doki_shared::{DokiError, EmbeddingConfig, EmbeddingProvider, Result, resolve_api_key};

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding space (model name and variant).
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Build the embedder selected by `[embedding]`.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.hashing_dimensions)?)),
        EmbeddingProvider::Openai => {
            let api_key = resolve_api_key(&config.api_key_env, "embedding")?;
            Ok(Arc::new(OpenAiEmbedder::new(
                &api_key,
                &config.base_url,
                &config.model,
                config.dimensions,
                config.batch_size,
            )?))
        }
    }
}

// ---------------------------------------------------------------------------
// Hashing embedder
// ---------------------------------------------------------------------------

/// Feature-hashed bag of lowercase words, L2-normalized.
///
/// Deterministic and offline. Texts sharing words score higher.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(DokiError::config("hashing_dimensions must be greater than 0"));
        }
        Ok(Self {
            dimensions,
            model_id: format!("hashing-v1-{dimensions}"),
        })
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible embeddings client
// ---------------------------------------------------------------------------

const DEFAULT_MAX_RETRIES: usize = 4;

/// Async client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
    max_retries: usize,
    retry_base: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimensions: Option<usize>,
        batch_size: usize,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(DokiError::config("missing embedding model name"));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| DokiError::config("embedding API key contains invalid characters"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|e| DokiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
            batch_size: batch_size.max(1),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: Duration::from_millis(500),
        })
    }

    /// Override the first retry delay (doubles per attempt, capped at 32x).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Send one request of at most `batch_size` inputs.
    async fn request_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let mut attempt = 0usize;
        loop {
            let failure = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                        DokiError::Embedding(format!("failed to parse embedding response: {e}"))
                    })?;
                    parsed.data.sort_by_key(|entry| entry.index);
                    if parsed.data.len() != inputs.len() {
                        return Err(DokiError::Embedding(format!(
                            "provider returned {} embeddings for {} inputs",
                            parsed.data.len(),
                            inputs.len()
                        )));
                    }
                    return Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    let message = format!("embeddings request failed ({status}): {body}");
                    if !should_retry(status) {
                        return Err(DokiError::Embedding(message));
                    }
                    message
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect() || e.is_request()) {
                        return Err(DokiError::Embedding(e.to_string()));
                    }
                    e.to_string()
                }
            };

            attempt += 1;
            if attempt >= self.max_retries {
                return Err(DokiError::Embedding(failure));
            }
            let backoff = self.retry_backoff(attempt);
            warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %failure, "retrying embeddings request");
            tokio::time::sleep(backoff).await;
        }
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.retry_base * (1 << capped)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DokiError::Embedding("provider returned no embedding".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(inputs = batch.len(), "requesting embeddings");
            vectors.extend(self.request_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
