//! # Narrative Chunker Core
//!
//! Shared, WASM-safe logic for narrative-chunker: token estimation,
//! context-aware splitting, overlap annotation, result recombination,
//! hierarchical summarization, and the provenance DAG.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! External services (LLM transformer, summarizer, embedder) are reached
//! through the async traits in [`traits`]; the application crate supplies
//! the concrete HTTP implementations and the bounded-concurrency chunk
//! processor.
//!
//! ```text
//! text ─▶ chunk::split ─▶ overlap::annotate ─▶ (processor) ─▶ recombine::recombine
//!   │
//!   └──▶ summarize::build_hierarchy ─▶ provenance::ProvenanceStore
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod overlap;
pub mod provenance;
pub mod recombine;
pub mod summarize;
pub mod token;
pub mod traits;
