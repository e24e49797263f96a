//! Core record types for tunesim.
//!
//! A [`Record`] is one indexed song: a UUID, its embedding, and a flat map of
//! [`MetadataValue`]s (title, artist, duration, `created_at`, extracted audio
//! features). The vector store owns records; the similarity index only ever
//! sees `(id, embedding)` pairs.

use crate::config;
use crate::error::{EngineError, Result};
use crate::hnsw::distance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A typed metadata value attached to a record.
///
/// Uses the default externally-tagged serde representation for bincode
/// compatibility. The server converts to/from untagged JSON at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Numeric view used by range filters.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Boolean(b)
    }
}

/// Record metadata: order-irrelevant, unique keys.
pub type Metadata = HashMap<String, MetadataValue>;

/// A stored song: identifier, embedding, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier (UUID v4), immutable and never reused.
    pub id: Uuid,
    /// Fixed-length embedding. Stored bit-exact as supplied.
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    /// Commit sequence number assigned by the store. Defines insertion order
    /// for tie-breaking and the replay order of index rebuilds.
    #[serde(default)]
    pub seq: u64,
}

impl Record {
    /// Creates a record with a fresh random UUID. `seq` is assigned by the store.
    pub fn new(embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self::with_id(Uuid::new_v4(), embedding, metadata)
    }

    /// Creates a record with a specific UUID.
    pub fn with_id(id: Uuid, embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id,
            embedding,
            metadata,
            seq: 0,
        }
    }
}

/// Check that `embedding` has the expected length and is usable under cosine similarity.
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<()> {
    if embedding.len() != dimension {
        return Err(EngineError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::InvalidInput(
            "embedding contains NaN or Inf".into(),
        ));
    }
    // Same f32 norm that scoring uses; underflow and overflow both land here
    let norm = distance::norm(embedding);
    if norm == 0.0 || !norm.is_finite() || !norm.recip().is_finite() {
        return Err(EngineError::InvalidInput(format!(
            "embedding norm {norm} is not usable for cosine similarity"
        )));
    }
    Ok(())
}

/// Enforce metadata size limits.
pub fn validate_metadata(metadata: &Metadata) -> Result<()> {
    if metadata.len() > config::MAX_METADATA_KEYS {
        return Err(EngineError::InvalidInput(format!(
            "metadata exceeds maximum of {} keys",
            config::MAX_METADATA_KEYS
        )));
    }
    let size: usize = metadata
        .iter()
        .map(|(k, v)| {
            k.len()
                + match v {
                    MetadataValue::String(s) => s.len(),
                    _ => 8,
                }
        })
        .sum();
    if size > config::MAX_METADATA_BYTES {
        return Err(EngineError::InvalidInput(format!(
            "metadata exceeds maximum size of {} bytes",
            config::MAX_METADATA_BYTES
        )));
    }
    Ok(())
}
