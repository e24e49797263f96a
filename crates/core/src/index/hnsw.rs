//! [`SimilarityIndex`] over an [`HnswGraph`].
//!
//! Record ids map onto dense internal node ids. Removal soft-deletes the node;
//! re-inserting an id tombstones the old node first, so an id never has two
//! live nodes. [`compact`](SimilarityIndex::compact) rebuilds the graph from
//! live nodes in their original order.

use crate::error::{EngineError, Result};
use crate::hnsw::distance;
use crate::hnsw::{knn_search_filtered, HnswConfig, HnswGraph};
use crate::index::{check_dimension, IdFilter, IndexKind, SimilarityIndex};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug)]
pub struct HnswIndex {
    graph: HnswGraph,
    id_to_internal: HashMap<Uuid, u32>,
    internal_to_id: Vec<Uuid>,
}

impl HnswIndex {
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            graph: HnswGraph::new(dimension, config),
            id_to_internal: HashMap::new(),
            internal_to_id: Vec::new(),
        }
    }

    /// Change the search beam width without rebuilding the graph.
    pub fn set_ef_search(&mut self, ef_search: usize) {
        self.graph.config.ef_search = ef_search.max(1);
    }
}

impl SimilarityIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn dimension(&self) -> usize {
        self.graph.dimension
    }

    fn len(&self) -> usize {
        self.graph.len()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.id_to_internal.contains_key(id)
    }

    fn ids(&self) -> Vec<Uuid> {
        self.internal_to_id
            .iter()
            .enumerate()
            .filter(|&(iid, _)| !self.graph.is_deleted(iid as u32))
            .map(|(_, id)| *id)
            .collect()
    }

    fn insert(&mut self, id: Uuid, embedding: &[f32]) -> Result<()> {
        check_dimension(self.graph.dimension, embedding)?;
        if let Some(old) = self.id_to_internal.remove(&id) {
            self.graph.mark_deleted(old);
        }
        let internal = self.graph.insert(embedding);
        debug_assert_eq!(internal as usize, self.internal_to_id.len());
        self.internal_to_id.push(id);
        self.id_to_internal.insert(id, internal);
        Ok(())
    }

    fn remove(&mut self, id: &Uuid) -> Result<()> {
        let internal = self
            .id_to_internal
            .remove(id)
            .ok_or(EngineError::NotFound(*id))?;
        self.graph.mark_deleted(internal);
        Ok(())
    }

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<IdFilter<'_>>,
    ) -> Result<Vec<(Uuid, f32)>> {
        check_dimension(self.graph.dimension, embedding)?;
        let hits = match filter {
            Some(f) => {
                let by_internal = |iid: u32| f(&self.internal_to_id[iid as usize]);
                knn_search_filtered(&self.graph, embedding, top_k, &by_internal)
            }
            None => knn_search_filtered(&self.graph, embedding, top_k, &|_: u32| true),
        };
        Ok(hits
            .into_iter()
            .map(|(d, iid)| {
                (
                    self.internal_to_id[iid as usize],
                    distance::similarity_from_distance(d),
                )
            })
            .collect())
    }

    fn deleted_count(&self) -> usize {
        self.graph.deleted_count()
    }

    fn tombstone_ratio(&self) -> f32 {
        self.graph.tombstone_ratio()
    }

    fn compact(&mut self) {
        if self.graph.deleted_count() == 0 {
            return;
        }
        let before = self.graph.node_count;
        let mut fresh = HnswIndex::new(self.graph.dimension, self.graph.config.clone());
        for (iid, id) in self.internal_to_id.iter().enumerate() {
            let iid = iid as u32;
            if !self.graph.is_deleted(iid) {
                let internal = fresh.graph.insert(self.graph.vector(iid));
                fresh.internal_to_id.push(*id);
                fresh.id_to_internal.insert(*id, internal);
            }
        }
        tracing::info!(
            nodes_before = before,
            nodes_after = fresh.graph.node_count,
            "compacted hnsw graph"
        );
        *self = fresh;
    }
}
