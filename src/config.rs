//! TOML configuration.
//!
//! Every section is optional; omitted keys take the defaults below.
//!
//! ```toml
//! [graph]
//! path = "data/graph.json"
//!
//! [chunking]
//! chunk_size = 2000
//! chunk_overlap = 300
//!
//! [llm]
//! base_url = "http://127.0.0.1:8080/v1"
//! model = "local"
//! timeout_secs = 60
//! rate_limit_ms = 100
//!
//! [embedding]
//! provider = "disabled"   # or "openai"
//!
//! [retrieval]
//! depth = 1
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_graph_path")]
    pub path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: default_graph_path(),
        }
    }
}

fn default_graph_path() -> PathBuf {
    PathBuf::from("data/graph.json")
}

#[derive(Debug, Deserialize, Clone)]
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
    docgraph_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    docgraph_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Environment variable holding a bearer token, if the server needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Overrides the per-request temperature when set.
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between per-chunk extraction calls.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: default_llm_timeout_secs(),
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://127.0.0.1:8080/v1".to_string()
}
fn default_llm_model() -> String {
    "local".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_rate_limit_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_embedding_base_url(),
            model: None,
            dims: None,
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/index.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_top_nodes")]
    pub top_nodes: usize,
    #[serde(default = "default_max_path_nodes")]
    pub max_path_nodes: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            top_nodes: default_top_nodes(),
            max_path_nodes: default_max_path_nodes(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_depth() -> usize {
    1
}
fn default_top_nodes() -> usize {
    15
}
fn default_max_path_nodes() -> usize {
    4
}
fn default_search_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["**/*.txt", "**/*.md", "**/*.markdown", "**/*.pdf", "**/*.docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size < 2 {
        anyhow::bail!("chunking.chunk_size must be >= 2");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    if config.retrieval.top_nodes == 0 {
        anyhow::bail!("retrieval.top_nodes must be >= 1");
    }
    if config.retrieval.max_path_nodes < 2 {
        anyhow::bail!("retrieval.max_path_nodes must be >= 2");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    crate::logger::parse_level(&config.log.level).context("log.level")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("dg.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&write(&dir, "")).unwrap();
        assert_eq!(config.chunking.chunk_size, 2000);
        assert_eq!(config.chunking.chunk_overlap, 300);
        assert_eq!(config.retrieval.depth, 1);
        assert_eq!(config.retrieval.top_nodes, 15);
        assert_eq!(config.llm.rate_limit_ms, 100);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[embedding]\nprovider = \"openai\"\ndims = 8\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[embedding]\nprovider = \"magic\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[log]\nlevel = \"chatty\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/dg.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dg.toml"));
    }
}
