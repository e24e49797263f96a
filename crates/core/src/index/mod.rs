//! Similarity index abstraction.
//!
//! The index is a derived, rebuildable view over the vector store: it holds
//! only `(id, embedding)` pairs and answers top-k cosine queries. Two
//! implementations exist behind [`SimilarityIndex`]:
//!
//! - [`FlatIndex`]: exact scan, the correctness reference.
//! - [`HnswIndex`]: approximate graph search for production sizes.

pub mod flat;
pub mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use crate::error::{EngineError, Result};
use crate::hnsw::HnswConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-candidate predicate evaluated during a query.
pub type IdFilter<'a> = &'a dyn Fn(&Uuid) -> bool;

/// Nearest-neighbor index over record embeddings, scored by cosine similarity.
pub trait SimilarityIndex: Send + Sync + fmt::Debug {
    fn kind(&self) -> IndexKind;

    /// Embedding width accepted by `insert` and `query`.
    fn dimension(&self) -> usize;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &Uuid) -> bool;

    /// Ids of all live entries, in insertion order.
    fn ids(&self) -> Vec<Uuid>;

    /// Add an entry. An id that is already present is replaced, never duplicated.
    fn insert(&mut self, id: Uuid, embedding: &[f32]) -> Result<()>;

    /// Remove an entry. Fails with `NotFound` if the id is absent.
    fn remove(&mut self, id: &Uuid) -> Result<()>;

    /// Up to `top_k` entries ordered by descending similarity, earlier
    /// insertions first on ties. Entries rejected by `filter` are skipped and
    /// the search widens to make up for them.
    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<IdFilter<'_>>,
    ) -> Result<Vec<(Uuid, f32)>>;

    /// Removed entries still holding memory.
    fn deleted_count(&self) -> usize {
        0
    }

    /// Share of held slots that belong to removed entries.
    fn tombstone_ratio(&self) -> f32 {
        let deleted = self.deleted_count();
        let slots = self.len() + deleted;
        if slots == 0 {
            0.0
        } else {
            deleted as f32 / slots as f32
        }
    }

    /// Reclaim space held by removed entries.
    fn compact(&mut self) {}
}

/// Which index implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Flat,
    #[default]
    Hnsw,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::Hnsw => "hnsw",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(IndexKind::Flat),
            "hnsw" => Ok(IndexKind::Hnsw),
            other => Err(format!("unknown index kind '{other}' (expected 'flat' or 'hnsw')")),
        }
    }
}

/// Build an empty index of the given kind.
pub fn new_index(kind: IndexKind, dimension: usize, hnsw: &HnswConfig) -> Box<dyn SimilarityIndex> {
    match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension)),
        IndexKind::Hnsw => Box::new(HnswIndex::new(dimension, hnsw.clone())),
    }
}

pub(crate) fn check_dimension(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}
