//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, ef_construction, ef_search, seed).
//! [`HnswGraph`] stores the graph using a Struct-of-Arrays layout: all embeddings
//! live contiguously in one `f32` arena, with parallel arrays for reciprocal
//! norms, neighbor lists, layer assignments and tombstones.

use crate::config;
use crate::hnsw::distance;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration parameters for an HNSW graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bidirectional links per node (except layer 0, which uses `m_max0`).
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search (higher = better recall, slower).
    pub ef_search: usize,
    /// Maximum number of layers in the graph.
    pub max_layers: usize,
    /// Seed for level assignment.
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            m_max0: config::HNSW_DEFAULT_M * 2,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            max_layers: config::HNSW_DEFAULT_MAX_LAYERS,
            seed: config::HNSW_DEFAULT_SEED,
        }
    }
}

impl HnswConfig {
    /// Default configuration with a custom `ef_search`.
    pub fn with_ef_search(ef_search: usize) -> Self {
        Self {
            ef_search: ef_search.max(1),
            ..Self::default()
        }
    }
}

/// HNSW graph in SoA layout. Internal node ids are dense `u32`s assigned in
/// insertion order; they double as the tie-breaker for equal distances.
#[derive(Debug)]
pub struct HnswGraph {
    pub config: HnswConfig,
    // SoA: f32 arena, `dimension` floats per node
    pub vectors: Vec<f32>,
    pub inv_norms: Vec<f32>,
    // SoA: graph structure
    pub neighbors: Vec<Vec<Vec<u32>>>, // [node_id][layer][neighbor_ids]
    pub layers: Vec<u8>,
    pub deleted: Vec<bool>,
    pub entry_point: Option<u32>,
    pub max_layer: usize,
    pub dimension: usize,
    pub node_count: u32,
    deleted_count: usize,
    rng: StdRng,
}

impl HnswGraph {
    /// Creates an empty graph for vectors of the given dimension.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            vectors: Vec::new(),
            inv_norms: Vec::new(),
            neighbors: Vec::new(),
            layers: Vec::new(),
            deleted: Vec::new(),
            entry_point: None,
            max_layer: 0,
            dimension,
            node_count: 0,
            deleted_count: 0,
            rng,
        }
    }

    /// Number of live (non-deleted) nodes.
    pub fn len(&self) -> usize {
        self.node_count as usize - self.deleted_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of soft-deleted nodes still occupying the arena.
    pub fn deleted_count(&self) -> usize {
        self.deleted_count
    }

    /// Draw a layer for a new node from the exponential distribution `floor(-ln(U) * mL)`.
    pub fn random_level(&mut self) -> usize {
        let ml = 1.0 / (self.config.m.max(2) as f64).ln();
        // gen() yields [0, 1); flip it so ln never sees 0
        let r: f64 = 1.0 - self.rng.gen::<f64>();
        let level = (-r.ln() * ml).floor() as usize;
        level.min(self.config.max_layers.saturating_sub(1))
    }

    /// Embedding of a node. O(1) slice into the arena.
    #[inline]
    pub fn vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    pub fn is_deleted(&self, id: u32) -> bool {
        self.deleted[id as usize]
    }

    /// Cosine distance from a query (with its reciprocal norm) to a node.
    #[inline]
    pub fn distance_to(&self, query: &[f32], query_inv_norm: f32, id: u32) -> f32 {
        distance::cosine_distance_prenorm(
            query,
            query_inv_norm,
            self.vector(id),
            self.inv_norms[id as usize],
        )
    }

    /// Cosine distance between two stored nodes.
    #[inline]
    pub fn node_distance(&self, a: u32, b: u32) -> f32 {
        self.distance_to(self.vector(a), self.inv_norms[a as usize], b)
    }

    /// Append a node's SoA fields. Returns its internal id.
    pub(crate) fn push_node(&mut self, vector: &[f32], level: usize) -> u32 {
        let id = self.node_count;
        self.vectors.extend_from_slice(vector);
        self.inv_norms.push(distance::inverse_norm(vector));
        self.neighbors.push(vec![Vec::new(); level + 1]);
        self.layers.push(level as u8);
        self.deleted.push(false);
        self.node_count += 1;
        id
    }

    /// Soft-delete a node. The node keeps routing traffic but never appears in results.
    /// Returns `false` if the id is out of range or already deleted.
    pub fn mark_deleted(&mut self, id: u32) -> bool {
        match self.deleted.get_mut(id as usize) {
            Some(flag) if !*flag => {
                *flag = true;
                self.deleted_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Fraction of arena slots occupied by tombstones.
    pub fn tombstone_ratio(&self) -> f32 {
        if self.node_count == 0 {
            0.0
        } else {
            self.deleted_count as f32 / self.node_count as f32
        }
    }
}
