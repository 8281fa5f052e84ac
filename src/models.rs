//! Core data models used throughout docchat.
//!
//! These types represent the uploaded files, extracted segments, chunks and
//! conversation turns that flow through the processing and chat pipeline.

use chrono::{DateTime, Utc};

/// A file handed to the session for processing: the original file name and
/// its raw bytes. The declared type is derived from the name's extension.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// A unit of extracted text with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Original file name of the upload.
    pub source: String,
    /// 1-based page (PDF) or slide (PPTX); `None` for whole-document formats.
    pub page: Option<u32>,
    pub text: String,
}

/// A token-bounded slice of a segment, ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id derived from source, page, index and text.
    pub id: String,
    pub source: String,
    pub page: Option<u32>,
    /// Position of this chunk within its segment, starting at 0.
    pub chunk_index: usize,
    pub text: String,
    pub token_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One question or answer in the conversation memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Ordered history of prior turns, supplied to every new question.
///
/// Append-only: turns are never removed or edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as `Human: ...` / `Assistant: ...` lines for prompts.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| match t.role {
                Role::User => format!("Human: {}", t.text),
                Role::Assistant => format!("Assistant: {}", t.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Citation shown under an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCitation {
    pub source: String,
    pub page: Option<u32>,
    pub excerpt: String,
}

/// Maximum characters of chunk text kept in a citation excerpt.
const EXCERPT_CHARS: usize = 240;

impl From<&Chunk> for SourceCitation {
    fn from(chunk: &Chunk) -> Self {
        Self {
            source: chunk.source.clone(),
            page: chunk.page,
            excerpt: chunk.text.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

/// A transcript entry as displayed to the user.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub sources: Vec<SourceCitation>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceCitation>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            created_at: Utc::now(),
        }
    }
}
