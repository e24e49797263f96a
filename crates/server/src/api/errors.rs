//! API error types mapped to HTTP status codes.
//!
//! Every error response has the body `{"error": "message", "kind": "code"}`,
//! where `kind` is the stable [`ErrorKind`] code of the underlying engine error.
//! A partial ingest also carries the record `id` so the caller can retry or
//! wait for reconciliation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tunesim_core::{EngineError, ErrorKind};

/// Application-level error type that implements `IntoResponse`.
///
/// Engine errors map by kind:
/// - `DimensionMismatch`, `InvalidInput`, `Embedder` → 400
/// - `NotFound` → 404
/// - `DuplicateId` → 409
/// - `PartialIngestFailure` → 202 (stored, not yet searchable)
/// - `StoreUnavailable`, `IndexUnavailable` → 503
#[derive(Debug)]
pub enum ApiError {
    /// An error raised by the engine.
    Engine(EngineError),
    /// Malformed request the engine never saw (400).
    BadRequest(String),
    /// Unexpected server error, e.g. a panicked blocking task (500).
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => match e.kind() {
                ErrorKind::DimensionMismatch | ErrorKind::InvalidInput | ErrorKind::Embedder => {
                    StatusCode::BAD_REQUEST
                }
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::DuplicateId => StatusCode::CONFLICT,
                ErrorKind::PartialIngestFailure => StatusCode::ACCEPTED,
                ErrorKind::StoreUnavailable | ErrorKind::IndexUnavailable => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => e.kind().as_str(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let body = match &self {
            ApiError::Engine(e @ EngineError::PartialIngestFailure { id, .. }) => {
                tracing::warn!(%id, "partial ingest: {}", e);
                json!({ "error": e.to_string(), "kind": kind, "id": id })
            }
            ApiError::Engine(e) => {
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    tracing::error!(kind, "engine unavailable: {}", e);
                }
                json!({ "error": e.to_string(), "kind": kind })
            }
            ApiError::BadRequest(msg) => json!({ "error": msg, "kind": kind }),
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                json!({ "error": msg, "kind": kind })
            }
        };
        (status, axum::Json(body)).into_response()
    }
}
