use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoaderConfig {
    /// PPTX extraction is off unless explicitly enabled.
    #[serde(default)]
    pub enable_presentations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    /// `"approx"` or `"huggingface"`.
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            tokenizer: default_tokenizer(),
            tokenizer_path: None,
        }
    }
}

fn default_max_tokens() -> usize {
    900
}
fn default_overlap() -> usize {
    100
}
fn default_tokenizer() -> String {
    "approx".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub url: Option<String>,
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
            model: None,
            dims: None,
            device: default_device(),
            normalize: true,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_device() -> String {
    "cpu".to_string()
}
fn default_true() -> bool {
    true
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

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// `"mmr"` or `"similarity"`.
    #[serde(default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_type: default_search_type(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
        }
    }
}

fn default_search_type() -> String {
    "mmr".to_string()
}
fn default_k() -> usize {
    4
}
fn default_fetch_k() -> usize {
    20
}
fn default_lambda_mult() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"gemini"` or `"openai"`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    /// Environment variable consulted when no key is given explicitly.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: 0.0,
            api_key_env: default_api_key_env(),
            base_url: None,
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-1.5-pro-latest".to_string()
}
fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[serde(default = "default_true")]
    pub rephrase_question: bool,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            rephrase_question: true,
            greeting: default_greeting(),
        }
    }
}

fn default_greeting() -> String {
    "Hello! Ask me anything about the documents you uploaded.".to_string()
}

impl Config {
    /// Check cross-field constraints. Called by [`load_config`]; call it
    /// yourself when building a `Config` in code.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            anyhow::bail!("chunking.max_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            anyhow::bail!("chunking.overlap_tokens must be < chunking.max_tokens");
        }
        match self.chunking.tokenizer.as_str() {
            "approx" => {}
            "huggingface" => {
                if self.chunking.tokenizer_path.is_none() {
                    anyhow::bail!("chunking.tokenizer_path is required for the huggingface tokenizer");
                }
            }
            other => anyhow::bail!(
                "Unknown tokenizer: '{}'. Must be approx or huggingface.",
                other
            ),
        }

        match self.embedding.provider.as_str() {
            "local" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be local or ollama.",
                other
            ),
        }
        if self.embedding.provider == "ollama" && self.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
        }
        if self.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.device != "cpu" {
            anyhow::bail!(
                "embedding.device '{}' is not supported; only cpu is available",
                self.embedding.device
            );
        }

        match self.retrieval.search_type.as_str() {
            "mmr" | "similarity" => {}
            other => anyhow::bail!(
                "Unknown retrieval.search_type: '{}'. Must be mmr or similarity.",
                other
            ),
        }
        if self.retrieval.k == 0 {
            anyhow::bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
        }
        if !(0.0..=1.0).contains(&self.retrieval.lambda_mult) {
            anyhow::bail!("retrieval.lambda_mult must be in [0.0, 1.0]");
        }

        match self.llm.provider.as_str() {
            "gemini" | "openai" => {}
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be gemini or openai.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}
