//! # DocumentGPT
//!
//! Ask questions about a single PDF, Word, or plain-text document and get
//! answers grounded in its content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌────────────┐
//! │  Upload  │──▶│ Extract +    │──▶│ Cached      │──▶│ In-memory  │
//! │ txt/pdf/ │   │ Chunk        │   │ Embeddings  │   │ Vector Idx │
//! │ docx     │   └──────────────┘   └─────────────┘   └─────┬──────┘
//! └──────────┘                                              │ top-k
//!                                                           ▼
//!   ┌────────────┐   ┌──────────────┐   ┌────────────────────────┐
//!   │ Transcript │◀──│ Streaming    │◀──│ Prompt (context +      │
//!   │ (Session)  │   │ Completion   │   │ question)              │
//!   └────────────┘   └──────────────┘   └────────────────────────┘
//! ```
//!
//! Runtime-free pieces (chunking, vector store, retriever, prompt,
//! transcript) live in the `docgpt-core` crate; this crate adds file
//! handling, remote providers, caching, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! docgpt chat ./report.pdf
//! docgpt ask ./notes.txt "What are the action items?"
//! docgpt ingest ./handbook.docx --dry-run
//! docgpt cache stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction from txt, pdf, docx |
//! | [`ingest`] | Upload persistence and chunking |
//! | [`tokens`] | BPE token counting |
//! | [`embedding`] | Remote embedding providers |
//! | [`embed_cache`] | On-disk embedding cache |
//! | [`pipeline`] | Upload → retriever, memoized per file |
//! | [`llm`] | Streaming chat backends |
//! | [`completion`] | Stream driver and display hooks |
//! | [`session`] | Active document and transcript |
//! | [`chat`] | REPL and one-shot answers |
//! | [`ingest_cmd`] | `ingest` command |
//! | [`cache_cmd`] | `cache` commands |
//! | [`progress`] | Progress reporting on stderr |
//! | [`remote`] | Remote call failures |

pub mod cache_cmd;
pub mod chat;
pub mod completion;
pub mod config;
pub mod embed_cache;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod ingest_cmd;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod session;
pub mod tokens;
