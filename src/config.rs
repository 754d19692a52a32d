use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub account: AccountConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub vector: Option<VectorConfig>,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub source: Option<SourceConfig>,
}

/// The single account this deployment is bound to.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub user_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Token budget per chunk for the per-file indexing strategy.
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_target_tokens() -> usize {
    500
}
fn default_overlap_tokens() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Narrower top-k used when building chat context on the fallback path.
    #[serde(default = "default_chat_top_k")]
    pub chat_top_k: usize,
    /// How many prior messages to replay as assistant chat history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            chat_top_k: default_chat_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_min_score() -> f32 {
    0.7
}
fn default_chat_top_k() -> usize {
    5
}
fn default_history_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_completion_timeout_secs() -> u64 {
    60
}

/// Vector store connection. The API key comes from `PINECONE_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// Index data-plane host, e.g. `https://myindex-abc123.svc.us-east-1.pinecone.io`.
    pub index_host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_api_host")]
    pub api_host: String,
    #[serde(default = "default_assistant_data_host")]
    pub data_host: String,
    /// Seconds to wait after creating a new assistant before using it.
    #[serde(default = "default_readiness_delay_secs")]
    pub readiness_delay_secs: u64,
    #[serde(default = "default_assistant_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_host: default_assistant_api_host(),
            data_host: default_assistant_data_host(),
            readiness_delay_secs: default_readiness_delay_secs(),
            timeout_secs: default_assistant_timeout_secs(),
        }
    }
}

fn default_assistant_api_host() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_assistant_data_host() -> String {
    "https://prod-1-data.ke.pinecone.io".to_string()
}
fn default_readiness_delay_secs() -> u64 {
    10
}
fn default_assistant_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Byte ceiling per upload batch.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

fn default_max_batch_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Fixed delay between files in the per-file strategy; 0 disables it.
    #[serde(default)]
    pub file_delay_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { file_delay_ms: 0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Local document source scanned by `ftalk index`.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.account.user_id.trim().is_empty() {
        anyhow::bail!("account.user_id must not be empty");
    }

    if config.chunking.target_tokens == 0 {
        anyhow::bail!("chunking.target_tokens must be > 0");
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    if config.retrieval.top_k == 0 || config.retrieval.chat_top_k == 0 {
        anyhow::bail!("retrieval.top_k and retrieval.chat_top_k must be >= 1");
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.batch.max_batch_bytes == 0 {
        anyhow::bail!("batch.max_batch_bytes must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_loads_with_defaults() {
        let f = write_config(
            r#"
[account]
user_id = "user-1"

[db]
path = "/tmp/ftalk.sqlite"

[server]
bind = "127.0.0.1:7400"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.target_tokens, 500);
        assert_eq!(cfg.chunking.overlap_tokens, 50);
        assert!((cfg.retrieval.min_score - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.retrieval.history_limit, 10);
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.batch.max_batch_bytes, 10 * 1024 * 1024);
        assert!(cfg.vector.is_none());
    }

    #[test]
    fn test_rejects_zero_chunk_budget() {
        let f = write_config(
            r#"
[account]
user_id = "user-1"

[db]
path = "/tmp/ftalk.sqlite"

[chunking]
target_tokens = 0

[server]
bind = "127.0.0.1:7400"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_min_score() {
        let f = write_config(
            r#"
[account]
user_id = "user-1"

[db]
path = "/tmp/ftalk.sqlite"

[retrieval]
min_score = 1.5

[server]
bind = "127.0.0.1:7400"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_rejects_unknown_embedding_provider() {
        let f = write_config(
            r#"
[account]
user_id = "user-1"

[db]
path = "/tmp/ftalk.sqlite"

[embedding]
provider = "mystery"

[server]
bind = "127.0.0.1:7400"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
