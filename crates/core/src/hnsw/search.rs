//! HNSW search: single-layer beam search and multi-layer KNN.
//!
//! A predicate `Fn(u32) -> bool` can be applied during traversal. Rejected and
//! soft-deleted nodes still route the search but never enter the result set.
//! Equal distances are ordered by internal id, i.e. by insertion order.

use crate::config;
use crate::hnsw::distance;
use crate::hnsw::graph::HnswGraph;
use crate::hnsw::visited::VisitedSet;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

thread_local! {
    /// Per-thread visit marks reused across queries.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::default());
}

/// Heap key: distance first, internal id second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scored {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Scored {
    fn new(distance: f32, id: u32) -> Self {
        Self {
            distance: OrderedFloat(distance),
            id,
        }
    }
}

/// Sort comparator for `(distance, id)` pairs: closest first, earlier id on ties.
pub(crate) fn by_distance_then_id(a: &(f32, u32), b: &(f32, u32)) -> Ordering {
    OrderedFloat(a.0)
        .cmp(&OrderedFloat(b.0))
        .then_with(|| a.1.cmp(&b.1))
}

/// Search a single layer of the graph.
/// Returns up to `ef` live nodes accepted by `filter_fn`, closest first.
/// Each call starts a new traversal on `visited`, sized to the graph.
#[allow(clippy::too_many_arguments)]
pub fn search_layer<F: Fn(u32) -> bool>(
    graph: &HnswGraph,
    query: &[f32],
    query_inv_norm: f32,
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    filter_fn: &F,
) -> Vec<(f32, u32)> {
    visited.begin(graph.node_count as usize);
    let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);

    for &ep in entry_points {
        if visited.visit(ep) {
            let entry = Scored::new(graph.distance_to(query, query_inv_norm, ep), ep);
            candidates.push(Reverse(entry));
            if !graph.is_deleted(ep) && filter_fn(ep) {
                results.push(entry);
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    while let Some(Reverse(candidate)) = candidates.pop() {
        if results.len() >= ef {
            if let Some(worst) = results.peek() {
                if candidate.distance > worst.distance {
                    break;
                }
            }
        }

        let node = candidate.id as usize;
        if layer >= graph.neighbors[node].len() {
            continue;
        }

        for &neighbor_id in &graph.neighbors[node][layer] {
            if !visited.visit(neighbor_id) {
                continue;
            }
            let entry = Scored::new(graph.distance_to(query, query_inv_norm, neighbor_id), neighbor_id);
            let improves = results.len() < ef || results.peek().is_some_and(|worst| entry < *worst);
            if !improves {
                continue;
            }
            candidates.push(Reverse(entry));
            if !graph.is_deleted(neighbor_id) && filter_fn(neighbor_id) {
                results.push(entry);
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// Multi-layer KNN search. Returns `(cosine distance, internal id)` pairs, closest first.
pub fn knn_search(graph: &HnswGraph, query: &[f32], k: usize) -> Vec<(f32, u32)> {
    knn_search_filtered(graph, query, k, &|_: u32| true)
}

/// Multi-layer KNN search with a predicate applied on layer 0.
///
/// If fewer than `k` results survive the predicate, the layer-0 search is
/// repeated with a doubled ef, up to `HNSW_MAX_OVERSAMPLE` times the base ef.
/// Distances are computed on the raw arena, so no rerank pass is needed.
pub fn knn_search_filtered<F: Fn(u32) -> bool>(
    graph: &HnswGraph,
    query: &[f32],
    k: usize,
    filter_fn: &F,
) -> Vec<(f32, u32)> {
    let entry_point = match graph.entry_point {
        Some(ep) if k > 0 => ep,
        _ => return Vec::new(),
    };
    let query_inv_norm = distance::inverse_norm(query);

    SEARCH_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();

        let no_filter = |_: u32| true;
        let mut current_ep = entry_point;
        for layer in (1..=graph.max_layer).rev() {
            let results = search_layer(
                graph,
                query,
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

        let base_ef = graph.config.ef_search.max(k);
        let max_ef = (base_ef * config::HNSW_MAX_OVERSAMPLE)
            .min(graph.node_count as usize)
            .max(base_ef);
        let mut ef = base_ef;
        let mut results = loop {
            let found = search_layer(
                graph,
                query,
                query_inv_norm,
                std::slice::from_ref(&current_ep),
                ef,
                0,
                &mut visited,
                filter_fn,
            );
            if found.len() >= k || ef >= max_ef {
                break found;
            }
            tracing::debug!(ef, found = found.len(), k, "filtered search short, widening ef");
            ef = (ef * 2).min(max_ef);
        };

        results.sort_unstable_by(by_distance_then_id);
        results.truncate(k);
        results
    })
}
