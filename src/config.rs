use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of chunks fed into the grounded prompt.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"local"` (fastembed) or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Ollama base URL (only used by the `"ollama"` provider).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on concurrent encode offloads to the blocking pool.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            url: None,
            timeout_secs: default_embed_timeout_secs(),
            max_inflight: default_max_inflight(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "multilingual-e5-large".to_string()
}
fn default_dims() -> usize {
    1024
}
fn default_batch_size() -> usize {
    32
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_max_inflight() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_url")]
    pub url: String,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            url: default_ocr_url(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

fn default_ocr_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_ocr_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Minimal in-memory config for tests and tooling that need no file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/study.sqlite"),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            ocr: OcrConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.max_inflight == 0 {
        anyhow::bail!("embedding.max_inflight must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "local" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local or ollama.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_defaults_fill_in() {
        let f = write_config("[db]\npath = \"/tmp/study.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.embedding.model, "multilingual-e5-large");
        assert_eq!(cfg.embedding.dims, 1024);
        assert_eq!(cfg.chunking.max_chars, 1000);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert!((cfg.llm.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let f = write_config(
            "[db]\npath = \"/tmp/study.sqlite\"\n[embedding]\nprovider = \"openai\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let f = write_config("[db]\npath = \"/tmp/study.sqlite\"\n[retrieval]\ntop_k = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_overlap_ge_max() {
        let f = write_config(
            "[db]\npath = \"/tmp/study.sqlite\"\n[chunking]\nmax_chars = 100\noverlap_chars = 100\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}
