//! Retrieval-augmented conversation engine.
//!
//! One [`ConversationEngine::ask`] call runs a full question cycle:
//!
//! 1. **Condense**: with prior turns in memory, the LLM rewrites the
//!    follow-up into a standalone question.
//! 2. **Retrieve**: the standalone question is embedded and matched
//!    against the [`VectorStore`].
//! 3. **Answer**: retrieved chunks, history and question are assembled
//!    into one prompt for the LLM.
//!
//! The engine reads the caller's memory and returns an extended copy; the
//! caller's memory is never modified, so a failed turn leaves it intact.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConversationConfig, RetrievalConfig};
use crate::embedding::Embedder;
use crate::llm::{ChatModel, LlmError};
use crate::models::{Chunk, ConversationMemory, Role};
use crate::store::VectorStore;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] anyhow::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

const CONDENSE_TEMPLATE: &str = "\
Given the following conversation and a follow up question, rephrase the \
follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

const ANSWER_TEMPLATE: &str = "\
Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to \
make up an answer.

{context}

Chat History:
{chat_history}

Question: {question}
Helpful Answer:";

/// Prompt templates. `{chat_history}`, `{question}` and `{context}` are
/// substituted before each call.
#[derive(Debug, Clone)]
pub struct Prompts {
    /// Run the condense step for follow-up questions.
    pub rephrase_question: bool,
    pub condense: String,
    pub answer: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            rephrase_question: true,
            condense: CONDENSE_TEMPLATE.to_string(),
            answer: ANSWER_TEMPLATE.to_string(),
        }
    }
}

impl From<&ConversationConfig> for Prompts {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            rephrase_question: config.rephrase_question,
            ..Self::default()
        }
    }
}

/// Result of one question cycle.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub answer: String,
    /// The input memory extended with this question and answer.
    pub memory: ConversationMemory,
    /// Chunks the answer was grounded on, in retrieval order.
    pub sources: Vec<Chunk>,
    /// The question actually used for retrieval.
    pub standalone_question: String,
}

pub struct ConversationEngine {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    retrieval: RetrievalConfig,
    prompts: Prompts,
}

impl ConversationEngine {
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        retrieval: RetrievalConfig,
        prompts: Prompts,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            retrieval,
            prompts,
        }
    }

    pub async fn ask(
        &self,
        question: &str,
        memory: &ConversationMemory,
    ) -> Result<EngineResponse, ChatError> {
        let history = memory.render();

        let standalone_question = if self.prompts.rephrase_question && !memory.is_empty() {
            let prompt = fill(
                &self.prompts.condense,
                &[("{chat_history}", history.as_str()), ("{question}", question)],
            );
            let rewritten = self.llm.complete(&prompt).await?;
            let rewritten = rewritten.trim();
            debug!(standalone = %rewritten, "condensed follow-up question");
            if rewritten.is_empty() {
                question.to_string()
            } else {
                rewritten.to_string()
            }
        } else {
            question.to_string()
        };

        let sources = self.retrieve(&standalone_question).await?;

        let context = format_context(&sources);
        let prompt = fill(
            &self.prompts.answer,
            &[
                ("{context}", context.as_str()),
                ("{chat_history}", history.as_str()),
                ("{question}", standalone_question.as_str()),
            ],
        );
        let answer = self.llm.complete(&prompt).await?.trim().to_string();
        info!(
            sources = sources.len(),
            answer_chars = answer.len(),
            model = self.llm.model_name(),
            "question answered"
        );

        let mut memory = memory.clone();
        memory.push(Role::User, question);
        memory.push(Role::Assistant, answer.clone());

        Ok(EngineResponse {
            answer,
            memory,
            sources,
            standalone_question,
        })
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>, ChatError> {
        let query_vec = self
            .embedder
            .embed_query(question)
            .await
            .map_err(ChatError::Retrieval)?;
        let hits = self
            .store
            .search(&query_vec, &self.retrieval)
            .map_err(ChatError::Retrieval)?;
        for hit in &hits {
            debug!(
                id = %hit.chunk.id,
                source = %hit.chunk.source,
                chunk = hit.chunk.chunk_index,
                score = hit.score,
                "retrieved"
            );
        }
        Ok(hits.into_iter().map(|h| h.chunk).collect())
    }
}

/// Render retrieved chunks as labelled context blocks.
fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| match c.page {
            Some(page) => format!("[{} p.{}]\n{}", c.source, page, c.text),
            None => format!("[{}]\n{}", c.source, c.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Single-pass placeholder substitution, so inserted text is never rescanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'outer: while !rest.is_empty() {
        for (key, value) in values {
            if let Some(after) = rest.strip_prefix(key) {
                out.push_str(value);
                rest = after;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}
