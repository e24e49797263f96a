//! HNSW insertion with bidirectional links and heuristic neighbor pruning
//! (Algorithm 4 of the HNSW paper).

use crate::hnsw::distance;
use crate::hnsw::graph::HnswGraph;
use crate::hnsw::search::{by_distance_then_id, search_layer};
use crate::hnsw::visited::VisitedSet;
use std::collections::HashSet;

impl HnswGraph {
    /// Insert a vector and return its internal id (always the previous `node_count`).
    pub fn insert(&mut self, vector: &[f32]) -> u32 {
        debug_assert_eq!(vector.len(), self.dimension);
        let level = self.random_level();

        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => {
                let id = self.push_node(vector, level);
                self.entry_point = Some(id);
                self.max_layer = level;
                return id;
            }
        };

        let query_inv_norm = distance::inverse_norm(vector);
        let mut visited = VisitedSet::default();
        let no_filter = |_: u32| true;

        // Phase 1: greedy descent from the top layer to level + 1
        let mut current_ep = entry_point;
        for layer in (level + 1..=self.max_layer).rev() {
            let results = search_layer(
                self,
                vector,
                query_inv_norm,
                std::slice::from_ref(&current_ep),
                1,
                layer,
                &mut visited,
                &no_filter,
            );
            if let Some(&(_, nearest)) = results.first() {
                current_ep = nearest;
            }
        }

        // Phase 2: collect neighbor lists for every layer the node lives on
        let top = level.min(self.max_layer);
        let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut layer_eps: Vec<u32> = vec![current_ep];
        for layer in (0..=top).rev() {
            let candidates = search_layer(
                self,
                vector,
                query_inv_norm,
                &layer_eps,
                self.config.ef_construction,
                layer,
                &mut visited,
                &no_filter,
            );
            let selected = select_neighbors_heuristic(self, &candidates, self.max_links(layer));
            node_neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();

            layer_eps.clear();
            layer_eps.extend(candidates.iter().map(|&(_, id)| id));
            if layer_eps.is_empty() {
                layer_eps.push(entry_point);
            }
        }

        let internal_id = self.push_node(vector, level);
        self.neighbors[internal_id as usize] = node_neighbors;

        // Phase 3: back-links, pruning neighbors that overflow
        for layer in 0..=top {
            let m_max = self.max_links(layer);
            let mine = self.neighbors[internal_id as usize][layer].clone();
            for neighbor_id in mine {
                let nid = neighbor_id as usize;
                while self.neighbors[nid].len() <= layer {
                    self.neighbors[nid].push(Vec::new());
                }
                self.neighbors[nid][layer].push(internal_id);

                if self.neighbors[nid][layer].len() > m_max {
                    let candidates: Vec<(f32, u32)> = self.neighbors[nid][layer]
                        .iter()
                        .map(|&cid| (self.node_distance(neighbor_id, cid), cid))
                        .collect();
                    let pruned = select_neighbors_heuristic(self, &candidates, m_max);
                    self.neighbors[nid][layer] = pruned.iter().map(|&(_, id)| id).collect();
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(internal_id);
        }
        internal_id
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }
}

/// Heuristic neighbor selection. A candidate is kept only if it is closer to the
/// base node than to every neighbor already kept; leftover slots are then filled
/// with the closest unused candidates.
fn select_neighbors_heuristic(
    graph: &HnswGraph,
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<(f32, u32)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable_by(by_distance_then_id);

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
    for &(dist_to_base, cid) in &sorted {
        if selected.len() >= m {
            break;
        }
        let is_diverse = selected
            .iter()
            .all(|&(_, sid)| dist_to_base <= graph.node_distance(cid, sid));
        if is_diverse {
            selected.push((dist_to_base, cid));
        }
    }

    if selected.len() < m {
        let taken: HashSet<u32> = selected.iter().map(|&(_, id)| id).collect();
        for &(dist, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !taken.contains(&cid) {
                selected.push((dist, cid));
            }
        }
    }

    selected
}
