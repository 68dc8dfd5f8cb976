//! # Study Harness
//!
//! A retrieval-augmented question-answering service for ingested course
//! material.
//!
//! Study Harness ingests lecture documents (PDFs, problem photos), chunks
//! and embeds them with the multilingual-e5 asymmetric convention, and
//! answers free-form academic questions by retrieving the most similar
//! excerpts and grounding a language-model generation on them, with
//! traceable source attribution.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Uploads    │──▶│   Pipeline   │──▶│  SQLite   │
//! │  PDF / OCR   │   │ Chunk+Embed  │   │ chunks+vec│
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!   question ──▶ encode ──▶ search ──────────┘
//!                   │          │
//!                   ▼          ▼
//!               compose ──▶ generate ──▶ answer + references
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Tagged per-boundary error types |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Asymmetric query/passage encoder |
//! | [`search`] | Vector similarity search |
//! | [`prompt`] | Grounded/ungrounded prompt composition |
//! | [`rag`] | Answer orchestration |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`extract`] | PDF/image text extraction |
//! | [`llm`] | Ollama generation backend |
//! | [`ocr`] | OCR service client |
//! | [`documents`] | Document metadata storage |
//! | [`conversations`] | Conversation audit log |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod conversations;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod prompt;
pub mod rag;
pub mod search;
pub mod server;
