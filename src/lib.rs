//! # docchat
//!
//! Chat with your documents. Upload PDF and DOCX files (PPTX when enabled),
//! and ask questions answered by a hosted LLM from the most relevant
//! passages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Extract  │──▶│  Chunk   │──▶│ Embed+Store  │
//! │ persist  │   │ PDF/DOCX │   │ 900/100  │   │ cosine / MMR │
//! └──────────┘   └──────────┘   └──────────┘   └──────┬───────┘
//!                                                     │
//!                 ┌──────────┐   ┌──────────────┐     │
//!                 │ Session  │──▶│ Conversation │◀────┘
//!                 │ (REPL)   │   │ engine + LLM │
//!                 └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! docchat chat report.pdf notes.docx
//! docchat ask report.pdf --question "What is the revenue forecast?"
//! docchat extract report.pdf        # no network, no key
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`upload`] | Persisting uploaded files |
//! | [`extract`] | PDF, DOCX and PPTX text extraction |
//! | [`tokens`] | Token counting |
//! | [`chunk`] | Recursive token-bounded chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | In-memory vector store with MMR |
//! | [`http`] | JSON over HTTP with retry |
//! | [`llm`] | Hosted LLM clients |
//! | [`conversation`] | Retrieval-augmented question answering |
//! | [`session`] | Per-user chat session |

pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod llm;
pub mod models;
pub mod session;
pub mod store;
pub mod tokens;
pub mod upload;
