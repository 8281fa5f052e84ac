//! Token counting used as the chunker's length function.
//!
//! Two counters are available:
//! - [`ApproxTokenCounter`]: a subword approximation needing no model files.
//! - `HfTokenCounter`: exact counts from a HuggingFace `tokenizer.json`
//!   (feature `hf-tokenizer`).

use anyhow::Result;
use std::sync::Arc;

use crate::config::ChunkingConfig;

/// Length function measured in tokens.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Characters per subword token inside an alphanumeric run.
const CHARS_PER_TOKEN: usize = 4;

/// Approximates a BPE tokenizer: every alphanumeric run costs one token per
/// four characters (rounded up), every other non-whitespace character costs
/// one token, whitespace is free.
///
/// The count is additive over splits at whitespace, so splitting text on
/// spaces or newlines never changes the total.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        let mut tokens = 0;
        let mut run = 0usize;
        for ch in text.chars() {
            if ch.is_alphanumeric() {
                run += 1;
                continue;
            }
            tokens += run.div_ceil(CHARS_PER_TOKEN);
            run = 0;
            if !ch.is_whitespace() {
                tokens += 1;
            }
        }
        tokens + run.div_ceil(CHARS_PER_TOKEN)
    }
}

#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenCounter {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            anyhow::anyhow!("Failed to load tokenizer {}: {}", path.display(), e)
        })?;
        Ok(Self { tokenizer })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.tokenizer
            .encode(text, false)
            .map(|enc| enc.len())
            // Unencodable input still has to be bounded; fall back to the estimate.
            .unwrap_or_else(|_| ApproxTokenCounter.count(text))
    }
}

/// Build the counter named by `chunking.tokenizer`.
pub fn create_counter(config: &ChunkingConfig) -> Result<Arc<dyn TokenCounter>> {
    match config.tokenizer.as_str() {
        "approx" => Ok(Arc::new(ApproxTokenCounter)),
        #[cfg(feature = "hf-tokenizer")]
        "huggingface" => {
            let path = config.tokenizer_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("chunking.tokenizer_path required for huggingface tokenizer")
            })?;
            Ok(Arc::new(HfTokenCounter::from_file(path)?))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        "huggingface" => anyhow::bail!(
            "The huggingface tokenizer requires building with --features hf-tokenizer"
        ),
        other => anyhow::bail!("Unknown tokenizer: {}", other),
    }
}
