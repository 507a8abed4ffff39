//! # Narrative Chunker
//!
//! Context-aware chunking and hierarchical summarization for long texts
//! that exceed an LLM's context window.
//!
//! The pure algorithms live in `narrative-chunker-core`; this crate adds
//! configuration, SQLite provenance storage, HTTP LLM and embedding
//! providers, the bounded-concurrency chunk processor, the `nchunk` CLI and
//! an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌───────────┐   ┌────────────┐
//! │   text   │──▶│ split + overlap │──▶│ processor │──▶│ recombiner │──▶ final text
//! └──────────┘   └────────┬────────┘   │ (LLM)     │   └────────────┘
//!                         │            └───────────┘
//!                         ▼
//!                ┌─────────────────┐   ┌──────────────────┐
//!                │  hierarchical   │──▶│ SQLite provenance│
//!                │  summarizer     │   │ DAG + embeddings │
//!                └─────────────────┘   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite provenance store |
//! | [`process`] | Bounded-concurrency chunk processor |
//! | [`cache`] | Caller-owned transform cache |
//! | [`llm`] | LLM transformer/summarizer providers |
//! | [`embedding`] | Embedding providers |
//! | [`pipeline`] | End-to-end transform and summarize runs |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP server |

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod process;
pub mod server;
pub mod sqlite_store;
