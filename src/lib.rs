//! Hybrid memory retrieval for agents.
//!
//! memsift stores short natural-language memories per owner and ranks them
//! against a query by combining three signals:
//!
//! | Signal | Source | Range |
//! |--------|--------|-------|
//! | Vector similarity | cosine over stored embeddings (sqlite-vec) | `[-1, 1]` |
//! | Lexical relevance | FTS5 BM25, min-max normalized per query | `[0, 1]` |
//! | Recency | `1 / (1 + ln(1 + days / scale))` | `(0, 1]` |
//!
//! The weighted sum (0.5 / 0.3 / 0.2 by default) orders the results; ties go to
//! the smaller memory id.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 and [sqlite-vec](https://github.com/asg017/sqlite-vec)
//! - **Embeddings**: local ONNX all-MiniLM-L6-v2, or an offline feature-hashing embedder
//! - **Retrieval**: vector and lexical search run as concurrent tasks with
//!   per-source timeouts; one failing source degrades the result to `partial`
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: database initialization, schema, migrations and health checks
//! - [`embedding`]: the embedding provider trait and its backends
//! - [`memory`]: memory types, metadata filters and the write path
//! - [`retrieval`]: index adapters, candidate merging, ranking and the coordinator

pub mod config;
pub mod db;
pub mod embedding;
pub mod memory;
pub mod retrieval;

#[doc(hidden)]
pub mod cli;
