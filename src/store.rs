//! In-memory vector store.
//!
//! Holds `(Chunk, vector)` pairs for one processed document set. Search is
//! brute-force cosine similarity over all stored vectors; maximal marginal
//! relevance (MMR) reranks the top `fetch_k` hits to trade relevance for
//! diversity:
//!
//! ```text
//! mmr(c) = λ · sim(query, c) − (1 − λ) · max sim(c, selected)
//! ```
//!
//! The store is built once and never mutated; processing new documents
//! builds a new store.

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Chunk;

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct VectorStore {
    vectors: Vec<StoredVector>,
    dims: usize,
}

impl VectorStore {
    /// Embed `chunks` in batches of `batch_size` and index them.
    ///
    /// Fails if the embedder returns vectors of a length other than its
    /// declared [`dims`](Embedder::dims).
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder, batch_size: usize) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let expected = embedder.dims();
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                bail!(
                    "Embedder returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                );
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != expected) {
                bail!(
                    "Embedder '{}' returned {}-dimensional vectors, expected {}",
                    embedder.model_name(),
                    bad.len(),
                    expected
                );
            }
            vectors.extend(embedded);
            debug!(done = vectors.len(), total = chunks.len(), "embedded batch");
        }
        let store = Self::from_parts(chunks, vectors)?;
        info!(
            chunks = store.len(),
            dims = store.dims,
            model = embedder.model_name(),
            "vector store built"
        );
        Ok(store)
    }

    /// Index pre-computed vectors. All vectors must share one dimension.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!("Inconsistent embedding dimensions: {} vs {}", bad.len(), dims);
        }
        let vectors = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredVector { chunk, vector })
            .collect();
        Ok(Self { vectors, dims })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Top `k` chunks by similarity. Ties keep insertion order.
    pub fn similarity_search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        self.ranked(query_vec)
            .into_iter()
            .take(k)
            .map(|(idx, score)| self.scored(idx, score))
            .collect()
    }

    /// Fetch `fetch_k` candidates by similarity, then select `k` of them by
    /// maximal marginal relevance. `lambda` of 1.0 is pure relevance, 0.0
    /// pure diversity.
    pub fn mmr_search(
        &self,
        query_vec: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Vec<ScoredChunk> {
        let mut remaining: Vec<(usize, f32)> = self
            .ranked(query_vec)
            .into_iter()
            .take(fetch_k.max(k))
            .collect();
        let k = k.min(remaining.len());
        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k);

        while selected.len() < k {
            let mut best_pos = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (pos, &(idx, relevance)) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|&(s, _)| {
                        cosine_similarity(&self.vectors[idx].vector, &self.vectors[s].vector)
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let score = if selected.is_empty() {
                    relevance
                } else {
                    lambda * relevance - (1.0 - lambda) * redundancy
                };
                if score > best_score {
                    best_score = score;
                    best_pos = pos;
                }
            }
            selected.push(remaining.remove(best_pos));
        }

        selected
            .into_iter()
            .map(|(idx, score)| self.scored(idx, score))
            .collect()
    }

    /// Dispatch on `retrieval.search_type`.
    pub fn search(&self, query_vec: &[f32], config: &RetrievalConfig) -> Result<Vec<ScoredChunk>> {
        if !self.is_empty() && query_vec.len() != self.dims {
            bail!(
                "Query vector has {} dimensions, store has {}",
                query_vec.len(),
                self.dims
            );
        }
        let hits = match config.search_type.as_str() {
            "similarity" => self.similarity_search(query_vec, config.k),
            "mmr" => self.mmr_search(query_vec, config.k, config.fetch_k, config.lambda_mult),
            other => bail!("Unknown search type: {}", other),
        };
        debug!(
            search_type = %config.search_type,
            hits = hits.len(),
            "retrieved chunks"
        );
        Ok(hits)
    }

    /// `(index, similarity)` for every entry, best first.
    fn ranked(&self, query_vec: &[f32]) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, sv)| (idx, cosine_similarity(query_vec, &sv.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    fn scored(&self, idx: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: self.vectors[idx].chunk.clone(),
            score,
        }
    }
}
