//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **`LocalEmbedder`**: runs a pretrained sentence model locally via
//!   fastembed; no network calls after the first model download.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`dot`]: inner product, equal to cosine similarity for unit vectors
//! - [`normalize`]: scale a vector to unit length
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named by
//! `embedding.provider` in the configuration.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::http::{send_json_with_retry, RetryPolicy};

/// Turns text into fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input order,
/// all of length [`dims`](Embedder::dims).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"multilingual-e5-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of document texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    ///
    /// Defaults to [`embed`](Embedder::embed); models trained with
    /// asymmetric query/passage inputs override it.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference through fastembed.
///
/// The model is downloaded from Hugging Face on first use and cached; it is
/// loaded lazily on the first call and reused for the life of the embedder.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    normalize: bool,
    batch_size: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        // Fail early on unknown names rather than at first embed.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            normalize: config.normalize,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    /// E5 models expect `query: ` / `passage: ` input prefixes.
    fn prefix(&self, kind: &'static str) -> &'static str {
        if self.model_name.contains("e5") {
            kind
        } else {
            ""
        }
    }

    async fn run(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)?;
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let model_name = self.model_name.clone();

        let mut vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Local embedding model lock poisoned"))?;
            if guard.is_none() {
                tracing::info!(model = %model_name, "loading local embedding model");
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(loaded);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("Local embedding model not loaded"))?;
            embedder
                .embed(inputs, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await??;

        if self.normalize {
            vectors.iter_mut().for_each(|v| normalize(v));
        }
        Ok(vectors)
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let prefix = self.prefix("passage: ");
        let inputs = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        self.run(inputs).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let prefix = self.prefix("query: ");
        self.run(vec![format!("{}{}", prefix, text)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Local models by config name, with their output dimensions.
#[cfg(feature = "local-embeddings-fastembed")]
const LOCAL_MODELS: &[(&str, usize)] = &[
    ("multilingual-e5-small", 384),
    ("multilingual-e5-base", 768),
    ("multilingual-e5-large", 1024),
    ("paraphrase-multilingual-mpnet-base-v2", 768),
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
];

#[cfg(feature = "local-embeddings-fastembed")]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let name = config
        .model
        .as_deref()
        .unwrap_or(LOCAL_MODELS[0].0)
        .to_string();
    let known = LOCAL_MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, dims)| *dims);
    let dims = config.dims.or(known).unwrap_or(384);
    (name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "paraphrase-multilingual-mpnet-base-v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMpnetBaseV2)
        }
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => {
            let supported: Vec<&str> = LOCAL_MODELS.iter().map(|(n, _)| *n).collect();
            bail!(
                "Local embedding model '{}' is not available; choose one of: {}",
                other,
                supported.join(", ")
            )
        }
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured Ollama URL (default: `http://localhost:11434`).
/// Requires Ollama to be running with an embedding model pulled (e.g. `ollama pull bge-m3`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    normalize: bool,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            normalize: config.normalize,
            client,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));

        let json = send_json_with_retry(|| self.client.post(&endpoint).json(&body), self.retry)
            .await
            .map_err(|e| {
                anyhow::anyhow!("Ollama embedding failed (is Ollama running at {}?): {}", self.url, e)
            })?;

        let mut vectors = parse_ollama_response(&json)?;
        debug!(count = vectors.len(), "ollama embeddings received");
        if self.normalize {
            vectors.iter_mut().for_each(|v| normalize(v));
        }
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let Some(rows) = json.get("embeddings").and_then(|e| e.as_array()) else {
        bail!("Ollama response has no \"embeddings\" array: {}", json);
    };
    rows.iter()
        .map(|row| -> Result<Vec<f32>> {
            let values = row
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Ollama embedding row is not an array"))?;
            Ok(values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

/// Create the [`Embedder`] named by `embedding.provider`.
///
/// | `embedding.provider` | Provider |
/// |----------------------|----------|
/// | `"local"` | `LocalEmbedder` (fastembed, feature `local-embeddings-fastembed`) |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let len = norm(v);
    if len > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= len);
    }
}

/// Inner product; `0.0` for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine of the angle between `a` and `b`, in `[-1.0, 1.0]`.
///
/// `0.0` when either vector is empty or zero, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let denom = norm(a) * norm(b);
    if denom < f32::EPSILON {
        0.0
    } else {
        dot(a, b) / denom
    }
}
