//! The engine handle: vector store, similarity index, and the coordination
//! between them.
//!
//! An [`Engine`] is opened explicitly, shared through `Arc`, and closed at
//! shutdown. The store is the source of truth; the index is rebuilt from it by
//! replaying records in commit order whenever the engine opens.

pub mod ingest;
pub mod locks;
pub mod pending;
pub mod query;

pub use ingest::ReconcileReport;
pub use locks::{IdGuard, IdLocks};
pub use pending::{PendingGuard, PendingSet};
pub use query::{QueryOptions, QueryTarget, SimilarSong};

use crate::config;
use crate::error::{EngineError, Result};
use crate::hnsw::HnswConfig;
use crate::index::{self, IndexKind, SimilarityIndex};
use crate::record::Record;
use crate::retry::RetryPolicy;
use crate::storage::VectorStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Runtime configuration of an [`Engine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Embedding width D, fixed for the lifetime of the data directory.
    pub dimension: usize,
    /// Directory for WAL and snapshot. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub index_kind: IndexKind,
    pub hnsw: HnswConfig,
    pub retry: RetryPolicy,
    /// Tombstone ratio that triggers index compaction. 0.0 disables it.
    pub compact_ratio: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: config::DEFAULT_DIMENSION,
            data_dir: None,
            index_kind: IndexKind::default(),
            hnsw: HnswConfig::default(),
            retry: RetryPolicy::default(),
            compact_ratio: config::DEFAULT_COMPACT_RATIO,
        }
    }
}

impl EngineConfig {
    /// In-memory configuration for the given dimension.
    pub fn ephemeral(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Durable configuration rooted at `data_dir`.
    pub fn durable(dimension: usize, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > config::MAX_DIMENSION {
            return Err(EngineError::InvalidInput(format!(
                "dimension must be between 1 and {}, got {}",
                config::MAX_DIMENSION,
                self.dimension
            )));
        }
        if !(0.0..1.0).contains(&self.compact_ratio) {
            return Err(EngineError::InvalidInput(format!(
                "compact_ratio must be in [0, 1), got {}",
                self.compact_ratio
            )));
        }
        Ok(())
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub dimension: usize,
    pub index_kind: IndexKind,
    pub records: usize,
    pub indexed: usize,
    pub tombstones: usize,
    pub pending: usize,
    pub wal_bytes: u64,
}

/// Music similarity engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: VectorStore,
    index: RwLock<Box<dyn SimilarityIndex>>,
    locks: IdLocks,
    pending: PendingSet,
}

impl Engine {
    /// Open the store described by `config` and rebuild the index from it.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = match &config.data_dir {
            Some(dir) => VectorStore::open(dir, config.dimension, config.retry.clone())?,
            None => VectorStore::ephemeral(config.dimension),
        };
        let index = build_index(&config, &store.records_in_commit_order())?;
        tracing::info!(
            dimension = config.dimension,
            index = %config.index_kind,
            records = store.len(),
            durable = store.is_durable(),
            "engine opened"
        );
        Ok(Self::assemble(config, store, index))
    }

    /// Open with a caller-supplied index instead of one built from `config.index_kind`.
    /// Stored records are replayed into it.
    pub fn open_with_index(config: EngineConfig, mut index: Box<dyn SimilarityIndex>) -> Result<Self> {
        config.validate()?;
        if index.dimension() != config.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: config.dimension,
                actual: index.dimension(),
            });
        }
        let store = match &config.data_dir {
            Some(dir) => VectorStore::open(dir, config.dimension, config.retry.clone())?,
            None => VectorStore::ephemeral(config.dimension),
        };
        for record in store.records_in_commit_order() {
            index.insert(record.id, &record.embedding)?;
        }
        Ok(Self::assemble(config, store, index))
    }

    fn assemble(config: EngineConfig, store: VectorStore, index: Box<dyn SimilarityIndex>) -> Self {
        Self {
            config,
            store,
            index: RwLock::new(index),
            locks: IdLocks::new(),
            pending: PendingSet::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Fetch a stored record.
    pub fn get(&self, id: &Uuid) -> Result<Record> {
        self.store.get(id)
    }

    /// Whether `id` is currently searchable.
    pub fn is_indexed(&self, id: &Uuid) -> bool {
        self.index.read().contains(id)
    }

    pub fn stats(&self) -> EngineStats {
        let (indexed, tombstones) = {
            let index = self.index.read();
            (index.len(), index.deleted_count())
        };
        EngineStats {
            dimension: self.config.dimension,
            index_kind: self.config.index_kind,
            records: self.store.len(),
            indexed,
            tombstones,
            pending: self.pending.len(),
            wal_bytes: self.store.wal_bytes(),
        }
    }

    /// Fold the WAL into a snapshot.
    pub fn checkpoint(&self) -> Result<usize> {
        self.store.checkpoint()
    }

    /// Compact the index if its tombstone ratio exceeds `compact_ratio`.
    /// Returns whether a compaction ran.
    pub fn compact_if_needed(&self) -> bool {
        if self.config.compact_ratio <= 0.0 {
            return false;
        }
        let ratio = self.index.read().tombstone_ratio();
        if ratio <= self.config.compact_ratio {
            return false;
        }
        tracing::info!(ratio, threshold = self.config.compact_ratio, "compacting index");
        self.index.write().compact();
        true
    }

    /// Checkpoint and release. In-memory engines just log.
    pub fn close(&self) -> Result<()> {
        let records = self.store.checkpoint()?;
        tracing::info!(records, durable = self.store.is_durable(), "engine closed");
        Ok(())
    }
}

/// Build a fresh index of the configured kind from `records`, in the given order.
fn build_index(config: &EngineConfig, records: &[Record]) -> Result<Box<dyn SimilarityIndex>> {
    let mut index = index::new_index(config.index_kind, config.dimension, &config.hnsw);
    for record in records {
        index.insert(record.id, &record.embedding)?;
    }
    Ok(index)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metadata;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_bad_dimension() {
        assert!(Engine::open(EngineConfig::ephemeral(0)).is_err());
        assert!(Engine::open(EngineConfig::ephemeral(config::MAX_DIMENSION + 1)).is_err());
    }

    #[test]
    fn test_rejects_bad_compact_ratio() {
        let mut cfg = EngineConfig::ephemeral(4);
        cfg.compact_ratio = 1.5;
        assert!(matches!(Engine::open(cfg), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_reopen_rebuilds_index_with_same_results() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig::durable(8, dir.path());
        let (probe, before) = {
            let engine = Engine::open(cfg.clone()).unwrap();
            let mut ids = Vec::new();
            for i in 0..40 {
                let v: Vec<f32> = (0..8).map(|j| ((i * 7 + j * 3) % 11) as f32 - 5.0).collect();
                ids.push(engine.ingest(v, Metadata::new()).unwrap());
            }
            let before = engine.find_similar(ids[3], 10, None).unwrap();
            engine.close().unwrap();
            (ids[3], before)
        };
        let engine = Engine::open(cfg).unwrap();
        assert_eq!(engine.stats().records, 40);
        assert_eq!(engine.stats().indexed, 40);
        let after = engine.find_similar(probe, 10, None).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reopen_without_close_replays_wal() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig::durable(2, dir.path());
        let id = {
            let engine = Engine::open(cfg.clone()).unwrap();
            engine.ingest(vec![1.0, 0.5], Metadata::new()).unwrap()
        };
        let engine = Engine::open(cfg).unwrap();
        assert!(engine.is_indexed(&id));
        assert_eq!(engine.get(&id).unwrap().embedding, vec![1.0, 0.5]);
    }

    #[test]
    fn test_compact_if_needed() {
        let mut cfg = EngineConfig::ephemeral(2);
        cfg.compact_ratio = 0.25;
        let engine = Engine::open(cfg).unwrap();
        let ids: Vec<Uuid> = (0..8)
            .map(|i| engine.ingest(vec![1.0, i as f32], Metadata::new()).unwrap())
            .collect();
        assert!(!engine.compact_if_needed());
        for id in &ids[..4] {
            engine.delete(id).unwrap();
        }
        assert_eq!(engine.stats().tombstones, 4);
        assert!(engine.compact_if_needed());
        assert_eq!(engine.stats().tombstones, 0);
        assert_eq!(engine.stats().indexed, 4);
    }

    #[test]
    fn test_flat_kind_has_no_tombstones() {
        let mut cfg = EngineConfig::ephemeral(2);
        cfg.index_kind = IndexKind::Flat;
        let engine = Engine::open(cfg).unwrap();
        let id = engine.ingest(vec![1.0, 0.0], Metadata::new()).unwrap();
        engine.delete(&id).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.index_kind, IndexKind::Flat);
        assert_eq!(stats.tombstones, 0);
        assert_eq!(stats.indexed, 0);
    }
}
