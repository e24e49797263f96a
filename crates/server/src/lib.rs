//! tunesim-server: HTTP server for the tunesim music similarity engine.
//!
//! Provides the REST API over a shared [`tunesim_core::Engine`].
//! Storage, indexing and query logic live in `tunesim-core`.

/// REST API layer: Axum router, HTTP handlers, models, metrics.
pub mod api;
