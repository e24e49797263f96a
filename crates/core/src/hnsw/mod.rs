//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor graph.
//!
//! Cosine distance only. Embeddings are stored as raw `f32` in a contiguous
//! arena alongside their reciprocal norms, so every distance is exact and the
//! graph needs no rerank pass. The [`crate::index::HnswIndex`] wrapper maps
//! record ids onto the dense internal ids used here.

/// Cosine distance kernels.
pub mod distance;
/// HNSW graph structure, configuration, and arena storage.
pub mod graph;
/// Insertion with bidirectional links and heuristic pruning.
pub mod insert;
/// Single-layer search, multi-layer KNN, and filtered search.
pub mod search;
/// Epoch-stamped visit marks that track the size of the walked graph.
pub mod visited;

pub use graph::{HnswConfig, HnswGraph};
pub use search::{knn_search, knn_search_filtered};
