//! # tunesim-core
//!
//! Embeddable music-similarity engine: a durable vector store of song
//! embeddings plus metadata, a cosine similarity index (exact or HNSW), and
//! the coordination that keeps the two consistent under concurrent ingests.
//!
//! This is the core library crate with zero async dependencies. The HTTP
//! server lives in `tunesim-server`.

/// Global configuration constants: limits, defaults, and tuning parameters.
pub mod config;
/// Embedding model boundary: the `Embedder` trait.
pub mod embed;
/// Engine handle: ingestion coordinator and query engine.
pub mod engine;
/// Error taxonomy with stable kinds.
pub mod error;
/// Metadata filter predicates.
pub mod filter;
/// HNSW graph: structure, insertion, search, and distance kernels.
pub mod hnsw;
/// Similarity index trait with flat and HNSW implementations.
pub mod index;
/// Record and metadata types.
pub mod record;
/// Bounded retry with exponential backoff.
pub mod retry;
/// Storage layer: vector store, write-ahead log, and snapshots.
pub mod storage;

pub use embed::{EmbedError, Embedder};
pub use engine::{Engine, EngineConfig, EngineStats, QueryOptions, QueryTarget, ReconcileReport, SimilarSong};
pub use error::{EngineError, ErrorKind, Result};
pub use filter::{FilterClause, FilterCondition, FilterOperator};
pub use index::{IndexKind, SimilarityIndex};
pub use record::{Metadata, MetadataValue, Record};
pub use retry::RetryPolicy;
