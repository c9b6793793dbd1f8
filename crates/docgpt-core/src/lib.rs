//! # DocGPT Core
//!
//! Runtime-free logic for DocGPT: data models, token-bounded chunking,
//! the embedder trait, the in-memory vector store, retrieval, prompt
//! assembly, and the session transcript.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Network-backed
//! embedders and chat backends live in the `docgpt` application crate and
//! plug in through [`embedding::Embedder`].

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod store;
pub mod transcript;
