//! Application configuration for Doki.
//!
//! User config lives at `~/.doki/doki.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DokiError, Result};
use crate::types::TextEncoding;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "doki.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".doki";

/// User-Agent string for crawl requests.
const DEFAULT_USER_AGENT: &str = concat!("Doki/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Config structs (matching doki.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub crawl: CrawlPoliciesConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory the crawler writes raw pages into.
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Directory holding the persistent vector index.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            index_dir: default_index_dir(),
        }
    }
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("data/scraped_html")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("data/vector_index")
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlPoliciesConfig {
    /// Maximum link depth from the seed URL.
    #[serde(default = "default_crawl_depth")]
    pub depth: u32,

    /// Maximum in-flight requests.
    #[serde(default = "default_crawl_concurrency")]
    pub concurrency: u32,

    /// Minimum ms to wait before each request.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Whether to respect robots.txt.
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,

    /// User-Agent sent with every request and matched against robots.txt groups.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// URL path include patterns.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL path exclude patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlPoliciesConfig {
    fn default() -> Self {
        Self {
            depth: default_crawl_depth(),
            concurrency: default_crawl_concurrency(),
            rate_limit_ms: default_rate_limit(),
            respect_robots_txt: true,
            user_agent: default_user_agent(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

fn default_crawl_depth() -> u32 {
    5
}
fn default_crawl_concurrency() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    200
}
fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Encodings tried in order before falling back to lossy UTF-8.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<TextEncoding>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            encodings: default_encodings(),
        }
    }
}

fn default_encodings() -> Vec<TextEncoding> {
    vec![
        TextEncoding::Utf8,
        TextEncoding::Windows1252,
        TextEncoding::Latin1,
    ]
}

/// `[chunking]` section. Both values are character counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

/// Which embedding backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Local feature-hashing embedder (no network, deterministic).
    Hashing,
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,

    /// Requested output dimensionality, for models that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    /// Maximum inputs per embeddings request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Vector length produced by the hashing provider.
    #[serde(default = "default_hashing_dimensions")]
    pub hashing_dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_key_env(),
            dimensions: None,
            batch_size: default_batch_size(),
            hashing_dimensions: default_hashing_dimensions(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Openai
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_batch_size() -> usize {
    64
}
fn default_hashing_dimensions() -> usize {
    384
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// OpenAI-compatible API root (chat completions live under it).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// HTTP timeout for one generation call.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_llm_key_env(),
            temperature: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_model() -> String {
    "llama3-8b-8192".into()
}
fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_llm_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the answer synthesizer.
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum crawl depth from the seed URL.
    pub depth: u32,
    /// Maximum concurrent HTTP requests.
    pub concurrency: u32,
    /// URL include glob patterns.
    pub include_patterns: Vec<String>,
    /// URL exclude glob patterns.
    pub exclude_patterns: Vec<String>,
    /// Delay in ms before each request.
    pub rate_limit_ms: u64,
    /// Whether to respect robots.txt.
    pub respect_robots_txt: bool,
    /// User-Agent header value.
    pub user_agent: String,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            depth: config.crawl.depth,
            concurrency: config.crawl.concurrency.max(1),
            include_patterns: config.crawl.include_patterns.clone(),
            exclude_patterns: config.crawl.exclude_patterns.clone(),
            rate_limit_ms: config.crawl.rate_limit_ms,
            respect_robots_txt: config.crawl.respect_robots_txt,
            user_agent: config.crawl.user_agent.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.doki/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DokiError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.doki/doki.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DokiError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DokiError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DokiError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| DokiError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DokiError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key named by `var_name`, failing if it is unset or empty.
pub fn resolve_api_key(var_name: &str, purpose: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(DokiError::config(format!(
            "{purpose} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every API key the configured providers need is present.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.llm.api_key_env, "LLM")?;
    if config.embedding.provider == EmbeddingProvider::Openai {
        resolve_api_key(&config.embedding.api_key_env, "embedding")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("content_dir"));
        assert!(toml_str.contains("GROQ_API_KEY"));
        assert!(toml_str.contains("iso-8859-1"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.depth, 5);
        assert_eq!(parsed.chunking.chunk_size, 1000);
        assert_eq!(parsed.chunking.chunk_overlap, 200);
        assert_eq!(parsed.retrieval.k, 5);
        assert_eq!(parsed.embedding.provider, EmbeddingProvider::Openai);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[paths]
index_dir = "/tmp/doki-index"

[embedding]
provider = "hashing"
hashing_dimensions = 64

[retrieval]
k = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.paths.index_dir, PathBuf::from("/tmp/doki-index"));
        assert_eq!(config.paths.content_dir, PathBuf::from("data/scraped_html"));
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
        assert_eq!(config.embedding.hashing_dimensions, 64);
        assert_eq!(config.retrieval.k, 3);
        assert_eq!(config.llm.model, "llama3-8b-8192");
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.depth, 5);
        assert_eq!(crawl.concurrency, 4);
        assert_eq!(crawl.rate_limit_ms, 200);
        assert!(crawl.respect_robots_txt);
        assert!(crawl.user_agent.starts_with("Doki/"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "DOKI_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
