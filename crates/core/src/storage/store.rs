//! The vector store: durable owner of every [`Record`].
//!
//! Records live in memory behind a `parking_lot::RwLock`. In durable mode each
//! mutation is appended to the write-ahead log (and fsynced) before it is
//! applied, and [`checkpoint`](VectorStore::checkpoint) folds the log into a
//! snapshot. Writers are serialized by a commit mutex so the duplicate/absence
//! check, sequence assignment and apply are atomic with respect to each other;
//! readers only wait for the in-memory apply.

use crate::config;
use crate::error::{EngineError, Result};
use crate::filter::FilterClause;
use crate::record::{self, Record};
use crate::retry::RetryPolicy;
use crate::storage::snapshot::StoreSnapshot;
use crate::storage::wal::{ReplayStats, WalEntry, WriteAheadLog};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<Uuid, Record>,
    next_seq: u64,
}

impl StoreState {
    /// Apply a replayed entry. Replay must tolerate entries already folded into
    /// the snapshot, so puts overwrite and deletes of absent ids are ignored.
    /// A record of the wrong dimension means the data directory belongs to a
    /// differently configured engine.
    fn apply_replayed(&mut self, entry: WalEntry, dimension: usize) -> Result<()> {
        match entry {
            WalEntry::Put { record } | WalEntry::Replace { record } => {
                if record.embedding.len() != dimension {
                    return Err(EngineError::StoreUnavailable(format!(
                        "WAL record {} has dimension {}, engine configured for {dimension}",
                        record.id,
                        record.embedding.len()
                    )));
                }
                self.next_seq = self.next_seq.max(record.seq + 1);
                self.records.insert(record.id, record);
            }
            WalEntry::Delete { id } => {
                self.records.remove(&id);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Durability {
    dir: PathBuf,
    wal: WriteAheadLog,
}

impl Durability {
    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(config::SNAPSHOT_FILE_NAME)
    }
}

/// Durable, thread-safe map from record id to [`Record`].
#[derive(Debug)]
pub struct VectorStore {
    dimension: usize,
    durability: Option<Durability>,
    state: RwLock<StoreState>,
    commit: Mutex<()>,
    retry: RetryPolicy,
}

impl VectorStore {
    /// In-memory store with no persistence.
    pub fn ephemeral(dimension: usize) -> Self {
        Self {
            dimension,
            durability: None,
            state: RwLock::new(StoreState::default()),
            commit: Mutex::new(()),
            retry: RetryPolicy::default(),
        }
    }

    /// Open (or create) a durable store in `dir`: load the snapshot, then
    /// replay the WAL on top of it.
    pub fn open(dir: impl AsRef<Path>, dimension: usize, retry: RetryPolicy) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut state = StoreState::default();

        let snapshot_path = dir.join(config::SNAPSHOT_FILE_NAME);
        if let Some(snapshot) = StoreSnapshot::load(&snapshot_path)? {
            if snapshot.dimension != dimension {
                return Err(EngineError::StoreUnavailable(format!(
                    "snapshot at {snapshot_path:?} has dimension {}, engine configured for {dimension}",
                    snapshot.dimension
                )));
            }
            state.next_seq = snapshot.next_seq;
            state.records = snapshot
                .records
                .into_iter()
                .map(|r| (r.id, r))
                .collect();
        }
        let from_snapshot = state.records.len();

        let wal = WriteAheadLog::open(&dir, config::WAL_FILE_NAME)?;
        let (entries, stats) = wal.replay()?;
        let applied = entries.len();
        for entry in entries {
            state.apply_replayed(entry, dimension)?;
        }
        log_replay(&stats, applied);
        if stats.has_damaged_tail() {
            tracing::warn!(
                valid_bytes = stats.valid_bytes,
                "cutting damaged WAL tail"
            );
            wal.truncate_to(stats.valid_bytes)?;
        }

        tracing::info!(
            dir = %dir.display(),
            dimension,
            from_snapshot,
            replayed = applied,
            records = state.records.len(),
            "opened vector store"
        );

        Ok(Self {
            dimension,
            durability: Some(Durability { dir, wal }),
            state: RwLock::new(state),
            commit: Mutex::new(()),
            retry,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_durable(&self) -> bool {
        self.durability.is_some()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.state.read().records.contains_key(id)
    }

    /// Insert a new record. Its `seq` is overwritten with the next commit number.
    pub fn put(&self, mut record: Record) -> Result<u64> {
        record::validate_embedding(&record.embedding, self.dimension)?;
        record::validate_metadata(&record.metadata)?;

        let _commit = self.commit.lock();
        if self.contains(&record.id) {
            return Err(EngineError::DuplicateId(record.id));
        }
        let seq = self.state.read().next_seq;
        record.seq = seq;
        self.log(&WalEntry::Put {
            record: record.clone(),
        })?;
        tracing::debug!(id = %record.id, seq, "stored record");
        self.apply_commit(record, seq);
        Ok(seq)
    }

    /// Swap the embedding and metadata of an existing record. The record gets a fresh `seq`.
    pub fn replace(&self, mut record: Record) -> Result<u64> {
        record::validate_embedding(&record.embedding, self.dimension)?;
        record::validate_metadata(&record.metadata)?;

        let _commit = self.commit.lock();
        if !self.contains(&record.id) {
            return Err(EngineError::NotFound(record.id));
        }
        let seq = self.state.read().next_seq;
        record.seq = seq;
        self.log(&WalEntry::Replace {
            record: record.clone(),
        })?;
        tracing::debug!(id = %record.id, seq, "replaced record");
        self.apply_commit(record, seq);
        Ok(seq)
    }

    pub fn get(&self, id: &Uuid) -> Result<Record> {
        self.state
            .read()
            .records
            .get(id)
            .cloned()
            .ok_or(EngineError::NotFound(*id))
    }

    /// Remove a record.
    pub fn delete(&self, id: &Uuid) -> Result<()> {
        let _commit = self.commit.lock();
        if !self.contains(id) {
            return Err(EngineError::NotFound(*id));
        }
        self.log(&WalEntry::Delete { id: *id })?;
        self.state.write().records.remove(id);
        tracing::debug!(%id, "deleted record");
        Ok(())
    }

    /// Whether the record exists and its metadata satisfies `filter`.
    pub fn metadata_matches(&self, id: &Uuid, filter: &FilterClause) -> bool {
        self.state
            .read()
            .records
            .get(id)
            .is_some_and(|r| filter.matches(&r.metadata))
    }

    /// All records sorted by commit sequence.
    pub fn records_in_commit_order(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.state.read().records.values().cloned().collect();
        records.sort_unstable_by_key(|r| r.seq);
        records
    }

    /// Ids of all stored records, unordered.
    pub fn ids(&self) -> Vec<Uuid> {
        self.state.read().records.keys().copied().collect()
    }

    /// Write a snapshot and empty the WAL. Writers are blocked for the duration.
    /// Returns the number of records captured; a no-op for ephemeral stores.
    pub fn checkpoint(&self) -> Result<usize> {
        let Some(durability) = &self.durability else {
            return Ok(0);
        };
        let _commit = self.commit.lock();
        let snapshot = {
            let state = self.state.read();
            let mut records: Vec<Record> = state.records.values().cloned().collect();
            records.sort_unstable_by_key(|r| r.seq);
            StoreSnapshot {
                dimension: self.dimension,
                next_seq: state.next_seq,
                records,
            }
        };
        let path = durability.snapshot_path();
        self.retry
            .run("snapshot save", || snapshot.save(&path).map_err(EngineError::from))?;
        self.retry
            .run("wal truncate", || durability.wal.truncate().map_err(EngineError::from))?;
        tracing::info!(records = snapshot.records.len(), "checkpoint complete");
        Ok(snapshot.records.len())
    }

    /// Size of the WAL in bytes, or 0 when ephemeral.
    pub fn wal_bytes(&self) -> u64 {
        self.durability.as_ref().map_or(0, |d| d.wal.len())
    }

    fn log(&self, entry: &WalEntry) -> Result<()> {
        match &self.durability {
            Some(d) => self
                .retry
                .run("wal append", || d.wal.append(entry).map_err(EngineError::from)),
            None => Ok(()),
        }
    }

    fn apply_commit(&self, record: Record, seq: u64) {
        let mut state = self.state.write();
        state.records.insert(record.id, record);
        state.next_seq = seq + 1;
    }
}

fn log_replay(stats: &ReplayStats, applied: usize) {
    if stats.skipped > 0 || stats.has_damaged_tail() {
        tracing::warn!(
            success = stats.success,
            skipped = stats.skipped,
            crc_errors = stats.crc_errors,
            truncated = stats.truncated,
            applied,
            "WAL replay finished with anomalies"
        );
    } else if stats.success > 0 {
        tracing::info!(entries = stats.success, applied, "WAL replay finished");
    }
}
