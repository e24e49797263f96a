//! Storage layer: the durable vector store, its write-ahead log, and snapshots.
//!
//! Records live in memory in a [`VectorStore`]. Durability comes from a
//! [`WriteAheadLog`] (CRC32 + fsync per append) and bincode snapshots
//! (atomic temp-file + rename).

/// Snapshot save/load with CRC footer.
pub mod snapshot;
/// The record store.
pub mod store;
/// Write-ahead log with CRC32 checksums.
pub mod wal;

pub use snapshot::StoreSnapshot;
pub use store::VectorStore;
pub use wal::{ReplayStats, WalEntry, WriteAheadLog};
