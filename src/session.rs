//! Per-user chat session.
//!
//! A [`ChatSession`] owns everything one user interacts with: the API
//! credential, the conversation engine built from the last processed
//! upload, the displayed transcript and the conversation memory.
//!
//! ```text
//! set_api_key ─▶ process(files) ─▶ submit(q) ─▶ submit(q) ...
//!                  │                  │
//!                  │ persist, load,   │ engine.ask(q, memory)
//!                  │ chunk, embed,    │ → transcript + memory
//!                  ▼ build store      ▼
//!               engine             answer + citations
//! ```
//!
//! Sessions are never shared; every method takes `&mut self`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::RecursiveSplitter;
use crate::config::{Config, EmbeddingConfig, LlmConfig};
use crate::conversation::{ChatError, ConversationEngine, Prompts};
use crate::embedding::{create_embedder, Embedder};
use crate::extract::{load_documents, LoadOptions, SkippedFile};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{ChatMessage, ConversationMemory, SourceCitation, UploadedFile};
use crate::store::VectorStore;
use crate::tokens::create_counter;
use crate::upload::persist_upload;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an API key is required before documents can be processed")]
    MissingCredential,
    #[error("no text could be extracted from the uploaded files")]
    NoSegments { skipped: Vec<SkippedFile> },
    #[error("process documents before asking questions")]
    NotProcessed,
    #[error("processing failed: {0:#}")]
    Processing(#[source] anyhow::Error),
    #[error(transparent)]
    Engine(#[from] ChatError),
}

/// Builds the model clients a session needs.
///
/// The default builds the configured providers; tests substitute fakes.
pub trait ModelFactory: Send + Sync {
    fn embedder(&self, config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>>;
    fn chat_model(&self, config: &LlmConfig, api_key: &str) -> anyhow::Result<Arc<dyn ChatModel>>;
}

pub struct DefaultModelFactory;

impl ModelFactory for DefaultModelFactory {
    fn embedder(&self, config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
        create_embedder(config)
    }

    fn chat_model(&self, config: &LlmConfig, api_key: &str) -> anyhow::Result<Arc<dyn ChatModel>> {
        create_chat_model(config, api_key)
    }
}

/// Summary of one processing run.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub files: usize,
    pub segments: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
}

pub struct ChatSession {
    session_id: Uuid,
    config: Config,
    factory: Box<dyn ModelFactory>,
    api_key: Option<String>,
    /// Created on first processing run and reused afterwards.
    embedder: Option<Arc<dyn Embedder>>,
    engine: Option<ConversationEngine>,
    transcript: Vec<ChatMessage>,
    memory: ConversationMemory,
}

impl ChatSession {
    pub fn new(config: Config) -> Self {
        Self::with_factory(config, Box::new(DefaultModelFactory))
    }

    pub fn with_factory(config: Config, factory: Box<dyn ModelFactory>) -> Self {
        let greeting = ChatMessage::assistant(config.conversation.greeting.clone(), Vec::new());
        Self {
            session_id: Uuid::new_v4(),
            config,
            factory,
            api_key: None,
            embedder: None,
            engine: None,
            transcript: vec![greeting],
            memory: ConversationMemory::new(),
        }
    }

    /// Blank keys clear the credential.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        let key = key.trim();
        self.api_key = (!key.is_empty()).then(|| key.to_string());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Persist, extract, chunk and index `files`, then (re)build the engine.
    ///
    /// On success the conversation memory starts fresh. On failure the
    /// previous engine, if any, stays in place.
    pub async fn process(&mut self, files: &[UploadedFile]) -> Result<ProcessReport, SessionError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(SessionError::MissingCredential)?;

        let upload_dir = &self.config.storage.upload_dir;
        for file in files {
            persist_upload(upload_dir, file).map_err(SessionError::Processing)?;
        }

        let options = LoadOptions {
            enable_presentations: self.config.loader.enable_presentations,
        };
        let loaded = load_documents(files, options);
        if loaded.segments.is_empty() {
            return Err(SessionError::NoSegments {
                skipped: loaded.skipped,
            });
        }

        let chunking = &self.config.chunking;
        let counter = create_counter(chunking).map_err(SessionError::Processing)?;
        let splitter = RecursiveSplitter::new(chunking.max_tokens, chunking.overlap_tokens, counter);
        let chunks = splitter.split_segments(&loaded.segments);
        let chunk_count = chunks.len();
        info!(
            session = %self.session_id,
            segments = loaded.segments.len(),
            chunks = chunk_count,
            tokens = chunks.iter().map(|c| c.token_count).sum::<usize>(),
            "documents chunked"
        );

        let embedder = match self.embedder.clone() {
            Some(embedder) => embedder,
            None => {
                let embedder = self
                    .factory
                    .embedder(&self.config.embedding)
                    .map_err(SessionError::Processing)?;
                self.embedder = Some(Arc::clone(&embedder));
                embedder
            }
        };
        let store = VectorStore::build(chunks, embedder.as_ref(), self.config.embedding.batch_size)
            .await
            .map_err(SessionError::Processing)?;

        let llm = self
            .factory
            .chat_model(&self.config.llm, &api_key)
            .map_err(SessionError::Processing)?;

        self.engine = Some(ConversationEngine::new(
            store,
            embedder,
            llm,
            self.config.retrieval.clone(),
            Prompts::from(&self.config.conversation),
        ));
        self.memory = ConversationMemory::new();

        Ok(ProcessReport {
            files: files.len(),
            segments: loaded.segments.len(),
            chunks: chunk_count,
            skipped: loaded.skipped,
        })
    }

    /// Record `query` in the transcript and answer it.
    ///
    /// The user message is kept even when answering fails; memory only
    /// changes when an answer is produced.
    pub async fn submit(&mut self, query: &str) -> Result<&ChatMessage, SessionError> {
        self.transcript.push(ChatMessage::user(query));

        let engine = self.engine.as_ref().ok_or(SessionError::NotProcessed)?;
        let response = match engine.ask(query, &self.memory).await {
            Ok(response) => response,
            Err(e) => {
                warn!(session = %self.session_id, "question failed: {}", e);
                return Err(e.into());
            }
        };

        debug!(
            session = %self.session_id,
            standalone = %response.standalone_question,
            sources = response.sources.len(),
            "question answered"
        );

        let sources = response.sources.iter().map(SourceCitation::from).collect();
        self.memory = response.memory;
        let index = self.transcript.len();
        self.transcript
            .push(ChatMessage::assistant(response.answer, sources));
        Ok(&self.transcript[index])
    }

    pub fn is_processed(&self) -> bool {
        self.engine.is_some()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn process_without_key_is_rejected() {
        let mut session = ChatSession::new(Config::default());
        let err = session
            .process(&[UploadedFile::new("a.pdf", Vec::new())])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingCredential));
        assert!(!session.is_processed());
    }

    #[tokio::test]
    async fn submit_before_processing_keeps_user_message() {
        let mut session = ChatSession::new(Config::default());
        let err = session.submit("hello?").await.unwrap_err();
        assert!(matches!(err, SessionError::NotProcessed));
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::Assistant);
        assert_eq!(transcript[1].content, "hello?");
        assert!(session.memory().is_empty());
    }

    #[test]
    fn blank_key_clears_credential() {
        let mut session = ChatSession::new(Config::default());
        session.set_api_key("  secret ");
        assert!(session.has_api_key());
        session.set_api_key("   ");
        assert!(!session.has_api_key());
    }
}
