//! Global configuration constants for tunesim.
//!
//! Tuning parameters, validation limits, and on-disk names live here.
//! Runtime configuration is carried by [`EngineConfig`](crate::engine::EngineConfig)
//! and, in the server, by CLI arguments and `TUNESIM_*` environment variables.

/// Default embedding dimension (width of the CLMR music encoder output).
pub const DEFAULT_DIMENSION: usize = 2048;

/// Maximum allowed embedding dimension.
pub const MAX_DIMENSION: usize = 8192;

/// Default number of results for a similarity query.
pub const DEFAULT_TOP_K: usize = 10;

/// Maximum number of results (`top_k`) per query.
pub const MAX_TOP_K: usize = 10_000;

/// Default number of bidirectional links per HNSW node.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 64;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_DEFAULT_MAX_LAYERS: usize = 16;

/// Seed for HNSW level assignment. A fixed seed makes replay-driven rebuilds
/// produce the same graph for the same commit order.
pub const HNSW_DEFAULT_SEED: u64 = 0x7475_6e65_7369_6d00;

/// Upper bound on the adaptive ef growth factor used when a filter rejects
/// most candidates.
pub const HNSW_MAX_OVERSAMPLE: usize = 8;

/// Maximum number of metadata keys per record.
pub const MAX_METADATA_KEYS: usize = 64;

/// Maximum total serialized size of metadata in bytes (64 KB).
pub const MAX_METADATA_BYTES: usize = 65_536;

/// Metadata key stamped with the ingestion time (RFC 3339, UTC).
pub const CREATED_AT_KEY: &str = "created_at";

/// Default number of attempts for store I/O and index updates.
pub const RETRY_DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff between retry attempts, in milliseconds.
pub const RETRY_DEFAULT_INITIAL_BACKOFF_MS: u64 = 10;

/// Cap on the exponential backoff, in milliseconds.
pub const RETRY_DEFAULT_MAX_BACKOFF_MS: u64 = 200;

/// File name of the write-ahead log inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.bin";

/// File name of the store snapshot inside the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "store.snap";

/// Default directory for WAL and snapshot files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 8040;

/// Default interval (in seconds) between automatic checkpoints. 0 = disabled.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 300;

/// Tombstone ratio above which the HNSW graph is rebuilt. 0.0 = disabled.
pub const DEFAULT_COMPACT_RATIO: f32 = 0.2;

/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum HTTP request body size in bytes (a 8192-d embedding in JSON fits comfortably).
pub const MAX_REQUEST_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Maximum number of concurrent in-flight requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 512;
