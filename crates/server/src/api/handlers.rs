//! HTTP request handlers and shared application state.
//!
//! Engine calls that may block (store fsync, retry backoff, graph search) run
//! on the blocking pool via [`run_blocking`]; cheap reads call the engine directly.

use crate::api::errors::ApiError;
use crate::api::metrics;
use crate::api::models::*;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tunesim_core::config;
use tunesim_core::{Engine, QueryOptions, QueryTarget, Record, SimilarSong};
use uuid::Uuid;

/// WAL size above which `/health` suggests a checkpoint.
const LARGE_WAL_BYTES: u64 = 1024 * 1024 * 1024;

/// Shared application state passed to every handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
}

/// Run `f` against the engine on the blocking thread pool.
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Engine) -> tunesim_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {e}")))?
        .map_err(ApiError::from)
}

fn outcome<T>(result: &Result<T, ApiError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

fn song_response(record: Record, with_embedding: bool) -> SongResponse {
    SongResponse {
        id: record.id,
        embedding: with_embedding.then_some(record.embedding),
        metadata: metadata_to_json(&record.metadata),
    }
}

fn similar_response(results: Vec<SimilarSong>, start: Instant) -> SimilarResponse {
    let results: Vec<SimilarSongResponse> = results.into_iter().map(Into::into).collect();
    SimilarResponse {
        count: results.len(),
        results,
        took_ms: start.elapsed().as_millis(),
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.engine.stats();
    let mut warnings = Vec::new();

    let unindexed = stats.records.saturating_sub(stats.indexed + stats.pending);
    if unindexed > 0 {
        warnings.push(format!(
            "{} stored songs are not searchable (run /admin/reconcile)",
            unindexed
        ));
    }
    if stats.wal_bytes > LARGE_WAL_BYTES {
        warnings.push(format!(
            "Large WAL: {} MB (consider /admin/checkpoint)",
            stats.wal_bytes / (1024 * 1024)
        ));
    }

    Json(HealthResponse {
        status: if warnings.is_empty() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        stats,
        warnings,
    })
}

/// `GET /metrics`
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// `POST /songs`
pub async fn ingest_song(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<SongResponse>), ApiError> {
    let metadata = json_to_metadata(req.metadata)?;
    let result = run_blocking(&state, move |engine| {
        let id = engine.ingest(req.embedding, metadata)?;
        engine.get(&id)
    })
    .await;
    metrics::record_ingest("ingest", outcome(&result));

    let record = result?;
    tracing::info!(id = %record.id, "song ingested");
    Ok((StatusCode::CREATED, Json(song_response(record, false))))
}

/// `GET /songs/:id`
pub async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SongResponse>, ApiError> {
    let record = state.engine.get(&id)?;
    Ok(Json(song_response(record, true)))
}

/// `PUT /songs/:id`
pub async fn reingest_song(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<SongResponse>, ApiError> {
    let metadata = json_to_metadata(req.metadata)?;
    let result = run_blocking(&state, move |engine| {
        engine.reingest(id, req.embedding, metadata)?;
        engine.get(&id)
    })
    .await;
    metrics::record_ingest("reingest", outcome(&result));

    let record = result?;
    tracing::info!(%id, "song re-ingested");
    Ok(Json(song_response(record, false)))
}

/// `DELETE /songs/:id`
pub async fn delete_song(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let result = run_blocking(&state, move |engine| engine.delete(&id)).await;
    metrics::record_ingest("delete", outcome(&result));

    result?;
    tracing::info!(%id, "song deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /songs/:id/similar`
///
/// The body is optional; without one the defaults apply. A body that is
/// present must parse.
pub async fn similar_songs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<SimilarResponse>, ApiError> {
    let req = parse_optional_body::<SimilarRequest>(&body)?;
    let options = QueryOptions {
        top_k: req.top_k.unwrap_or(config::DEFAULT_TOP_K),
        filter: req.filter,
        min_score: req.min_score,
    };
    find_similar(&state, id, options).await
}

fn parse_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

/// `GET /songs/:id/similar?limit=N`
pub async fn similar_songs_by_limit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<SimilarResponse>, ApiError> {
    let options = QueryOptions::top_k(query.limit.unwrap_or(config::DEFAULT_TOP_K));
    find_similar(&state, id, options).await
}

async fn find_similar(
    state: &AppState,
    id: Uuid,
    options: QueryOptions,
) -> Result<Json<SimilarResponse>, ApiError> {
    let start = Instant::now();
    let results = run_blocking(state, move |engine| {
        engine.search(QueryTarget::Record(id), &options)
    })
    .await?;
    metrics::record_query("by_id", start.elapsed());
    Ok(Json(similar_response(results, start)))
}

/// `POST /search`
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SimilarResponse>, ApiError> {
    let start = Instant::now();
    let options = QueryOptions {
        top_k: req.top_k.unwrap_or(config::DEFAULT_TOP_K),
        filter: req.filter,
        min_score: req.min_score,
    };
    let embedding = req.embedding;
    let results = run_blocking(&state, move |engine| {
        engine.search(QueryTarget::Vector(&embedding), &options)
    })
    .await?;
    metrics::record_query("by_vector", start.elapsed());
    Ok(Json(similar_response(results, start)))
}

/// `POST /admin/reconcile`
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileResponse>, ApiError> {
    let start = Instant::now();
    let report = run_blocking(&state, |engine| engine.reconcile()).await?;
    let elapsed_ms = start.elapsed().as_millis();
    tracing::info!(
        inserted = report.inserted,
        removed = report.removed,
        skipped_pending = report.skipped_pending,
        elapsed_ms = elapsed_ms as u64,
        "reconcile complete"
    );
    Ok(Json(ReconcileResponse { report, elapsed_ms }))
}

/// `POST /admin/rebuild`
pub async fn rebuild_index(
    State(state): State<AppState>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let start = Instant::now();
    let indexed = run_blocking(&state, |engine| engine.rebuild_index()).await?;
    Ok(Json(RebuildResponse {
        indexed,
        elapsed_ms: start.elapsed().as_millis(),
    }))
}

/// `POST /admin/checkpoint`
pub async fn checkpoint(
    State(state): State<AppState>,
) -> Result<Json<CheckpointResponse>, ApiError> {
    let start = Instant::now();
    let records = run_blocking(&state, |engine| engine.checkpoint()).await?;
    Ok(Json(CheckpointResponse {
        records,
        elapsed_ms: start.elapsed().as_millis(),
    }))
}
