//! Query engine: top-k similar songs for a stored record or a raw embedding.
//!
//! Read-only. The index is consulted under its read lock with a per-candidate
//! predicate (self-exclusion and metadata filter), then hits are joined with
//! store metadata. A hit whose record vanished between the two steps is dropped.

use super::Engine;
use crate::config;
use crate::error::{EngineError, Result};
use crate::filter::FilterClause;
use crate::record::{self, Metadata};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarSong {
    pub id: Uuid,
    /// Cosine similarity in \[-1, 1\].
    pub score: f32,
    pub metadata: Metadata,
}

/// What to search around.
#[derive(Debug, Clone, Copy)]
pub enum QueryTarget<'a> {
    /// A stored record; the record itself is excluded from the results.
    Record(Uuid),
    /// A raw embedding.
    Vector(&'a [f32]),
}

/// Query knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub top_k: usize,
    #[serde(default)]
    pub filter: Option<FilterClause>,
    /// Drop hits scoring below this similarity.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: config::DEFAULT_TOP_K,
            filter: None,
            min_score: None,
        }
    }
}

impl QueryOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }
}

impl Engine {
    /// Songs most similar to the stored record `id`, excluding `id` itself.
    pub fn find_similar(
        &self,
        id: Uuid,
        top_k: usize,
        filter: Option<&FilterClause>,
    ) -> Result<Vec<SimilarSong>> {
        self.search_with(QueryTarget::Record(id), top_k, filter, None)
    }

    /// Songs most similar to `embedding`.
    pub fn find_similar_by_vector(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&FilterClause>,
    ) -> Result<Vec<SimilarSong>> {
        self.search_with(QueryTarget::Vector(embedding), top_k, filter, None)
    }

    /// General form of the two queries above.
    pub fn search(&self, target: QueryTarget<'_>, options: &QueryOptions) -> Result<Vec<SimilarSong>> {
        self.search_with(target, options.top_k, options.filter.as_ref(), options.min_score)
    }

    fn search_with(
        &self,
        target: QueryTarget<'_>,
        top_k: usize,
        filter: Option<&FilterClause>,
        min_score: Option<f32>,
    ) -> Result<Vec<SimilarSong>> {
        if top_k == 0 {
            return Err(EngineError::InvalidInput("top_k must be at least 1".into()));
        }
        let top_k = top_k.min(config::MAX_TOP_K);

        let (embedding, exclude): (Cow<'_, [f32]>, Option<Uuid>) = match target {
            QueryTarget::Record(id) => (Cow::Owned(self.store.get(&id)?.embedding), Some(id)),
            QueryTarget::Vector(v) => {
                record::validate_embedding(v, self.dimension())?;
                (Cow::Borrowed(v), None)
            }
        };
        let filter = filter.filter(|f| !f.is_empty());

        let accept = |candidate: &Uuid| {
            exclude.map_or(true, |own| *candidate != own)
                && filter.map_or(true, |f| self.store.metadata_matches(candidate, f))
        };
        let predicate: Option<&dyn Fn(&Uuid) -> bool> = if exclude.is_some() || filter.is_some() {
            Some(&accept)
        } else {
            None
        };

        let hits = self.index.read().query(&embedding, top_k, predicate)?;

        let mut results = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            if min_score.is_some_and(|min| score < min) {
                break;
            }
            match self.store.get(&id) {
                Ok(record) => results.push(SimilarSong {
                    id,
                    score,
                    metadata: record.metadata,
                }),
                Err(_) => tracing::debug!(%id, "hit vanished before metadata join"),
            }
        }
        Ok(results)
    }
}
