//! Exact brute-force index. O(N·D) per query.

use crate::error::{EngineError, Result};
use crate::hnsw::distance;
use crate::index::{check_dimension, IdFilter, IndexKind, SimilarityIndex};
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct FlatEntry {
    id: Uuid,
    vector: Vec<f32>,
    inv_norm: f32,
    /// Insertion counter; lower wins ties.
    order: u64,
}

/// Linear scan over every live entry.
#[derive(Debug, Default)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<FlatEntry>,
    positions: HashMap<Uuid, usize>,
    next_order: u64,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    fn detach(&mut self, id: &Uuid) -> Option<FlatEntry> {
        let pos = self.positions.remove(id)?;
        let entry = self.entries.swap_remove(pos);
        if let Some(moved) = self.entries.get(pos) {
            self.positions.insert(moved.id, pos);
        }
        Some(entry)
    }
}

impl SimilarityIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.positions.contains_key(id)
    }

    fn ids(&self) -> Vec<Uuid> {
        let mut live: Vec<&FlatEntry> = self.entries.iter().collect();
        live.sort_unstable_by_key(|e| e.order);
        live.into_iter().map(|e| e.id).collect()
    }

    fn insert(&mut self, id: Uuid, embedding: &[f32]) -> Result<()> {
        check_dimension(self.dimension, embedding)?;
        self.detach(&id);
        let order = self.next_order;
        self.next_order += 1;
        self.positions.insert(id, self.entries.len());
        self.entries.push(FlatEntry {
            id,
            vector: embedding.to_vec(),
            inv_norm: distance::inverse_norm(embedding),
            order,
        });
        Ok(())
    }

    fn remove(&mut self, id: &Uuid) -> Result<()> {
        self.detach(id).map(|_| ()).ok_or(EngineError::NotFound(*id))
    }

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<IdFilter<'_>>,
    ) -> Result<Vec<(Uuid, f32)>> {
        check_dimension(self.dimension, embedding)?;
        let query_inv = distance::inverse_norm(embedding);

        let mut scored: Vec<(f32, u64, Uuid)> = self
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f(&e.id)))
            .map(|e| {
                let d = distance::cosine_distance_prenorm(embedding, query_inv, &e.vector, e.inv_norm);
                (d, e.order, e.id)
            })
            .collect();
        scored.sort_unstable_by_key(|&(d, order, _)| (OrderedFloat(d), order));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(d, _, id)| (id, distance::similarity_from_distance(d)))
            .collect())
    }
}
