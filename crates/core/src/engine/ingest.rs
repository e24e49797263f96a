//! Ingestion coordinator: the store-then-index commit and its repair paths.
//!
//! Every mutation of a record runs under that record's [`IdLocks`](super::IdLocks)
//! guard. The store commit comes first and is durable; the index update follows
//! and is retried with the engine's [`RetryPolicy`](crate::retry::RetryPolicy).
//! If the index still refuses, the caller gets `PartialIngestFailure` with the
//! id: the record is stored but not searchable until [`Engine::reconcile`] or
//! [`Engine::rebuild_index`] runs.

use super::{build_index, Engine};
use crate::index::SimilarityIndex;
use crate::config;
use crate::embed::Embedder;
use crate::error::{EngineError, Result};
use crate::record::{self, Metadata, MetadataValue, Record};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Outcome of [`Engine::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Stored records that were missing from the index and got inserted.
    pub inserted: usize,
    /// Index entries with no stored record that got removed.
    pub removed: usize,
    /// Ids left alone because an ingest on them was still in flight.
    pub skipped_pending: usize,
}

impl Engine {
    /// Store a new record and make it searchable. Returns its fresh id.
    pub fn ingest(&self, embedding: Vec<f32>, mut metadata: Metadata) -> Result<Uuid> {
        record::validate_embedding(&embedding, self.dimension())?;
        stamp_created_at(&mut metadata);
        record::validate_metadata(&metadata)?;

        let record = Record::new(embedding, metadata);
        let id = record.id;
        let _pending = self.pending.register(id);
        let _lock = self.locks.lock(id);

        let seq = self.store.put(record.clone())?;
        self.index_insert(id, &record.embedding)?;
        tracing::debug!(%id, seq, "ingested record");
        Ok(id)
    }

    /// Embed `pcm` with `embedder`, then [`ingest`](Engine::ingest) the result.
    pub fn ingest_pcm<E: Embedder + ?Sized>(
        &self,
        embedder: &E,
        pcm: &[f32],
        metadata: Metadata,
    ) -> Result<Uuid> {
        let embedding = embedder.embed(pcm)?;
        if embedding.len() != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: embedding.len(),
            });
        }
        self.ingest(embedding, metadata)
    }

    /// Replace the embedding and metadata of an existing record. The old index
    /// entry is swapped for the new one under a single index write lock.
    /// `created_at` carries over when the new metadata does not set it.
    ///
    /// If the new embedding cannot be indexed, the old entry is dropped so the
    /// id reads as missing and [`Engine::reconcile`] indexes the stored record.
    pub fn reingest(&self, id: Uuid, embedding: Vec<f32>, mut metadata: Metadata) -> Result<()> {
        record::validate_embedding(&embedding, self.dimension())?;
        let _pending = self.pending.register(id);
        let _lock = self.locks.lock(id);

        let previous = self.store.get(&id)?;
        if !metadata.contains_key(config::CREATED_AT_KEY) {
            if let Some(created) = previous.metadata.get(config::CREATED_AT_KEY) {
                metadata.insert(config::CREATED_AT_KEY.to_string(), created.clone());
            }
        }
        record::validate_metadata(&metadata)?;

        let record = Record::with_id(id, embedding, metadata);
        let seq = self.store.replace(record.clone())?;
        if let Err(e) = self.index_insert(id, &record.embedding) {
            self.drop_stale_entry(&id);
            return Err(e);
        }
        tracing::debug!(%id, seq, "reingested record");
        Ok(())
    }

    /// Remove a record from the store, then from the index.
    pub fn delete(&self, id: &Uuid) -> Result<()> {
        let _lock = self.locks.lock(*id);
        self.store.delete(id)?;
        let removed = self.config.retry.run("index remove", || {
            match self.index.write().remove(id) {
                // Never indexed (partial ingest) or already dropped by a rebuild
                Err(EngineError::NotFound(_)) => Ok(()),
                other => other,
            }
        });
        if let Err(e) = removed {
            tracing::warn!(%id, error = %e, "record deleted from store but still indexed");
            return Err(e);
        }
        tracing::debug!(%id, "deleted record");
        Ok(())
    }

    /// Bring the index back in line with the store: index stored records that
    /// are missing and drop entries whose record is gone. Ids with an ingest in
    /// flight are skipped.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let indexed: HashSet<Uuid> = self.index.read().ids().into_iter().collect();

        let mut stored = HashSet::with_capacity(self.store.len());
        for record in self.store.records_in_commit_order() {
            stored.insert(record.id);
            if indexed.contains(&record.id) {
                continue;
            }
            if self.pending.contains(&record.id) {
                report.skipped_pending += 1;
                continue;
            }
            let _lock = self.locks.lock(record.id);
            // Re-check under the lock: a delete or ingest may have finished meanwhile
            if self.store.contains(&record.id) && !self.is_indexed(&record.id) {
                self.index_insert(record.id, &record.embedding)?;
                report.inserted += 1;
            }
        }

        for id in indexed.difference(&stored) {
            if self.pending.contains(id) {
                report.skipped_pending += 1;
                continue;
            }
            let _lock = self.locks.lock(*id);
            if !self.store.contains(id) {
                let mut index = self.index.write();
                if index.contains(id) {
                    index.remove(id)?;
                    report.removed += 1;
                }
            }
        }

        if report.inserted > 0 || report.removed > 0 {
            tracing::info!(
                inserted = report.inserted,
                removed = report.removed,
                skipped_pending = report.skipped_pending,
                "reconciled index with store"
            );
        }
        Ok(report)
    }

    /// Build a fresh index from the store in commit order and swap it in.
    ///
    /// Phase A copies the records, phase B builds without holding the index
    /// lock, phase C swaps under the write lock and catches up with any
    /// commits that landed during phase B. Returns the number of indexed records.
    pub fn rebuild_index(&self) -> Result<usize> {
        let (fresh, built) = self.build_detached()?;
        self.swap_in(fresh, built)
    }

    /// Phases A and B: copy the store and build an index off to the side.
    fn build_detached(&self) -> Result<(Box<dyn SimilarityIndex>, BuiltFrom)> {
        let records = self.store.records_in_commit_order();
        let built = BuiltFrom {
            records: records.len(),
            through_seq: records.last().map(|r| r.seq),
        };
        let fresh = build_index(&self.config, &records)?;
        Ok((fresh, built))
    }

    /// Phase C. A record committed after the copy, including a reingest of a
    /// copied id, carries a later `seq` and is indexed again from the store.
    fn swap_in(&self, fresh: Box<dyn SimilarityIndex>, built: BuiltFrom) -> Result<usize> {
        let mut index = self.index.write();
        *index = fresh;
        let live: HashSet<Uuid> = self.store.ids().into_iter().collect();
        let mut caught_up = 0usize;
        for record in self.store.records_in_commit_order() {
            let committed_later = built.through_seq.map_or(true, |seq| record.seq > seq);
            if committed_later || !index.contains(&record.id) {
                index.insert(record.id, &record.embedding)?;
                caught_up += 1;
            }
        }
        let stale: Vec<Uuid> = index.ids().into_iter().filter(|id| !live.contains(id)).collect();
        for id in &stale {
            index.remove(id)?;
        }
        let indexed = index.len();
        drop(index);

        tracing::info!(
            built_from = built.records,
            caught_up,
            dropped = stale.len(),
            indexed,
            "rebuilt similarity index"
        );
        Ok(indexed)
    }

    /// Remove whatever the index holds for `id` after a failed replacement.
    fn drop_stale_entry(&self, id: &Uuid) {
        let removed = self.config.retry.run("index remove", || {
            match self.index.write().remove(id) {
                Err(EngineError::NotFound(_)) => Ok(()),
                other => other,
            }
        });
        if let Err(e) = removed {
            tracing::error!(%id, error = %e, "stale index entry left behind; rebuild the index");
        }
    }

    fn index_insert(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        self.config
            .retry
            .run("index insert", || self.index.write().insert(id, embedding))
            .map_err(|e| {
                tracing::warn!(%id, error = %e, "record stored but not indexed");
                EngineError::PartialIngestFailure {
                    id,
                    reason: e.to_string(),
                }
            })
    }
}

/// What phase A of a rebuild copied out of the store.
#[derive(Debug, Clone, Copy)]
struct BuiltFrom {
    records: usize,
    /// Highest `seq` in the copy.
    through_seq: Option<u64>,
}

/// Set `created_at` to now (RFC 3339, UTC) unless the caller supplied one.
fn stamp_created_at(metadata: &mut Metadata) {
    metadata
        .entry(config::CREATED_AT_KEY.to_string())
        .or_insert_with(|| MetadataValue::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)));
}
