//! # nsr-search
//!
//! A Rust web service for searching Nuclear Science References (NSR)
//! bibliographic records with a hybrid pipeline combining lexical
//! pre-filtering, vector semantic search, and a retrieval-augmented chat
//! endpoint grounded in both the local corpus and external literature.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!                │  User Query   │
//!                └──────┬────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │  `#`-prefix  │          │  Free text    │
//!   │  lexical     │          │  embed (cache │
//!   │  key lookup  │          │  30 min TTL)  │
//!   └─────────────┘          └──────┬────────┘
//!                                   │
//!                                   ▼
//!                     ┌──────────────────────────┐
//!                     │  Lexical pre-filter       │
//!                     │  (cap 200 candidates)     │
//!                     └────────────┬──────────────┘
//!                                  │ on error: pure-vector fallback
//!                                  ▼
//!                     ┌──────────────────────────┐
//!                     │  Cosine ranking           │
//!                     │  threshold 0.3, top 20    │
//!                     └──────────────────────────┘
//! ```
//!
//! The chat path retrieves with a stricter threshold (0.35, top 8), merges
//! in author and nuclide/reaction exact matches, fetches external papers
//! best-effort, and streams the answer as SSE with a `sources` frame first.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, and LLM settings
//! - [`error`] - HTTP error taxonomy and the retryable embedding provider error
//! - [`models`] - Shared data types: `NsrRecord`, `SourcesBundle`, request/response types
//! - [`store`] - In-memory record store with JSON persistence and typed search methods
//! - [`cache`] - TTL embedding cache and the bounded client result cache
//! - [`search::lexical`] - Substring search with `#`-prefixed identifier-only mode
//! - [`search::vector`] - Cosine ranking and the hybrid lexical pre-filter
//! - [`llm::embeddings`] - Single and batch embedding generation via OpenAI-compatible APIs
//! - [`llm::chat_stream`] - Streaming chat completions and SSE line framing
//! - [`external::s2`] - Best-effort Semantic Scholar paper search
//! - [`rag`] - Query signal extraction, result merging, and prompt assembly
//! - [`api`] - Axum HTTP handlers for records, search, and chat
//! - [`client`] - Client-side query orchestration, result cache, and chat sessions
//! - [`state`] - Shared application state holding the store, caches, and HTTP client

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod external;
pub mod llm;
pub mod models;
pub mod rag;
pub mod search;
pub mod state;
pub mod store;
