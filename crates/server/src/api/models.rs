//! Request and response data transfer objects for the REST API.
//!
//! All types derive `Serialize` and/or `Deserialize` for JSON marshalling via Axum.
//! Metadata travels as plain JSON scalars; the core stores it as tagged
//! [`MetadataValue`]s, so the two helpers below convert at the boundary.

use crate::api::errors::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tunesim_core::{EngineStats, FilterClause, Metadata, MetadataValue, ReconcileReport, SimilarSong};
use uuid::Uuid;

/// Convert JSON metadata from a request into core metadata.
///
/// Only scalars are accepted. Integers that fit in `i64` stay integers, every
/// other number becomes a float.
pub fn json_to_metadata(map: HashMap<String, serde_json::Value>) -> Result<Metadata, ApiError> {
    map.into_iter()
        .map(|(k, v)| {
            let mv = match v {
                serde_json::Value::Bool(b) => MetadataValue::Boolean(b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => MetadataValue::Integer(i),
                    None => MetadataValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                serde_json::Value::String(s) => MetadataValue::String(s),
                other => {
                    return Err(ApiError::BadRequest(format!(
                        "metadata '{}' must be a string, number or boolean, got {}",
                        k,
                        json_type_name(&other)
                    )))
                }
            };
            Ok((k, mv))
        })
        .collect()
}

/// Convert core metadata to JSON for a response.
pub fn metadata_to_json(map: &Metadata) -> HashMap<String, serde_json::Value> {
    map.iter()
        .map(|(k, v)| {
            let jv = match v {
                MetadataValue::Boolean(b) => serde_json::Value::Bool(*b),
                MetadataValue::Integer(i) => serde_json::json!(*i),
                MetadataValue::Float(f) => serde_json::json!(*f),
                MetadataValue::String(s) => serde_json::Value::String(s.clone()),
            };
            (k.clone(), jv)
        })
        .collect()
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
        _ => "scalar",
    }
}

/// Request body for `POST /songs` and `PUT /songs/:id`.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Request body for `POST /songs/:id/similar`.
#[derive(Debug, Default, Deserialize)]
pub struct SimilarRequest {
    pub top_k: Option<usize>,
    pub filter: Option<FilterClause>,
    pub min_score: Option<f32>,
}

/// Query string for `GET /songs/:id/similar`.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Request body for `POST /search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub embedding: Vec<f32>,
    pub top_k: Option<usize>,
    pub filter: Option<FilterClause>,
    pub min_score: Option<f32>,
}

/// A stored song. `embedding` is only filled in by `GET /songs/:id`.
#[derive(Debug, Serialize)]
pub struct SongResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One ranked hit.
#[derive(Debug, Serialize)]
pub struct SimilarSongResponse {
    pub id: Uuid,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl From<SimilarSong> for SimilarSongResponse {
    fn from(song: SimilarSong) -> Self {
        Self {
            id: song.id,
            score: song.score,
            metadata: metadata_to_json(&song.metadata),
        }
    }
}

/// Response body for similarity queries.
#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub results: Vec<SimilarSongResponse>,
    pub count: usize,
    pub took_ms: u128,
}

/// Response body for `POST /admin/reconcile`.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    #[serde(flatten)]
    pub report: ReconcileReport,
    pub elapsed_ms: u128,
}

/// Response body for `POST /admin/rebuild`.
#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub indexed: usize,
    pub elapsed_ms: u128,
}

/// Response body for `POST /admin/checkpoint`.
#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub records: usize,
    pub elapsed_ms: u128,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub stats: EngineStats,
    pub warnings: Vec<String>,
}
