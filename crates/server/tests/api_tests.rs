use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tunesim_core::{Engine, EngineConfig, IndexKind};
use tunesim_server::api::create_router;
use tunesim_server::api::handlers::AppState;

async fn spawn_app(engine: Arc<Engine>) -> String {
    let prometheus_handle =
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(_) => metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        };

    let state = AppState {
        engine,
        prometheus_handle,
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base_url
}

async fn spawn_ephemeral(dimension: usize, index: IndexKind) -> String {
    let config = EngineConfig {
        index_kind: index,
        ..EngineConfig::ephemeral(dimension)
    };
    spawn_app(Arc::new(Engine::open(config).unwrap())).await
}

fn client() -> Client {
    Client::new()
}

async fn ingest(base_url: &str, embedding: Vec<f32>, metadata: Value) -> reqwest::Response {
    client()
        .post(format!("{}/songs", base_url))
        .json(&json!({ "embedding": embedding, "metadata": metadata }))
        .send()
        .await
        .expect("Failed to ingest song")
}

async fn ingest_id(base_url: &str, embedding: Vec<f32>, metadata: Value) -> String {
    let resp = ingest(base_url, embedding, metadata).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

fn result_ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dimension"], 4);
    assert_eq!(body["index_kind"], "hnsw");
    assert_eq!(body["records"], 0);
}

#[tokio::test]
async fn test_ingest_then_get() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = ingest(
        &base_url,
        vec![0.1, 0.2, 0.3, 0.4],
        json!({ "title": "So What", "year": 1959 }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let id = body["id"].as_str().unwrap();
    assert_eq!(body["metadata"]["title"], "So What");
    assert!(body["metadata"]["created_at"].is_string());
    assert!(body.get("embedding").is_none());

    let resp = client()
        .get(format!("{}/songs/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["metadata"]["year"], 1959);
    let embedding: Vec<f32> = serde_json::from_value(body["embedding"].clone()).unwrap();
    assert_eq!(embedding, vec![0.1, 0.2, 0.3, 0.4]);
}

#[tokio::test]
async fn test_ingest_wrong_dimension() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = ingest(&base_url, vec![1.0, 0.0, 0.0], json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "dimension_mismatch");
    assert!(body["error"].as_str().unwrap().contains("expected 4"));
}

#[tokio::test]
async fn test_ingest_rejects_nested_metadata() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = ingest(
        &base_url,
        vec![1.0, 0.0, 0.0, 0.0],
        json!({ "tags": { "genre": "jazz" } }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn test_ingest_zero_vector_is_invalid() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = ingest(&base_url, vec![0.0; 4], json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_get_unknown_song() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .get(format!("{}/songs/{}", base_url, uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_similar_excludes_self_and_ranks() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({ "title": "A" })).await;
    let b = ingest_id(&base_url, vec![0.9, 0.1, 0.0, 0.0], json!({ "title": "B" })).await;
    let c = ingest_id(&base_url, vec![0.0, 1.0, 0.0, 0.0], json!({ "title": "C" })).await;

    let resp = client()
        .post(format!("{}/songs/{}/similar", base_url, a))
        .json(&json!({ "top_k": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(result_ids(&body), vec![b.clone(), c]);
    assert_eq!(body["count"], 2);
    assert_eq!(body["results"][0]["metadata"]["title"], "B");
    let top = body["results"][0]["score"].as_f64().unwrap();
    let second = body["results"][1]["score"].as_f64().unwrap();
    assert!(top > second);

    let resp = client()
        .get(format!("{}/songs/{}/similar?limit=1", base_url, a))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(result_ids(&body), vec![b]);
}

#[tokio::test]
async fn test_similar_without_body_uses_defaults() {
    let base_url = spawn_ephemeral(4, IndexKind::Flat).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({})).await;
    ingest_id(&base_url, vec![0.0, 1.0, 0.0, 0.0], json!({})).await;

    let resp = client()
        .post(format!("{}/songs/{}/similar", base_url, a))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_similar_rejects_malformed_body() {
    let base_url = spawn_ephemeral(4, IndexKind::Flat).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({})).await;
    ingest_id(&base_url, vec![0.0, 1.0, 0.0, 0.0], json!({})).await;

    for body in [r#"{"top_k": 1"#, r#"{"top_k": "five"}"#, "not json"] {
        let resp = client()
            .post(format!("{}/songs/{}/similar", base_url, a))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        let err: Value = resp.json().await.unwrap();
        assert_eq!(err["kind"], "bad_request");
    }
}

#[tokio::test]
async fn test_similar_unknown_song() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .get(format!("{}/songs/{}/similar", base_url, uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_similar_zero_top_k() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({})).await;
    let resp = client()
        .post(format!("{}/songs/{}/similar", base_url, a))
        .json(&json!({ "top_k": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_search_by_vector_with_filter() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({ "genre": "rock" })).await;
    let jazz = ingest_id(&base_url, vec![0.8, 0.2, 0.0, 0.0], json!({ "genre": "jazz" })).await;
    ingest_id(&base_url, vec![0.0, 0.0, 1.0, 0.0], json!({ "genre": "jazz" })).await;

    let resp = client()
        .post(format!("{}/search", base_url))
        .json(&json!({
            "embedding": [1.0, 0.0, 0.0, 0.0],
            "top_k": 1,
            "filter": { "must": [{ "field": "genre", "op": "eq", "value": "jazz" }] }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(result_ids(&body), vec![jazz]);
}

#[tokio::test]
async fn test_search_min_score() {
    let base_url = spawn_ephemeral(4, IndexKind::Flat).await;
    let near = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({})).await;
    ingest_id(&base_url, vec![0.0, 1.0, 0.0, 0.0], json!({})).await;

    let resp = client()
        .post(format!("{}/search", base_url))
        .json(&json!({ "embedding": [1.0, 0.1, 0.0, 0.0], "min_score": 0.5 }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(result_ids(&body), vec![near]);
}

#[tokio::test]
async fn test_search_wrong_dimension() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .post(format!("{}/search", base_url))
        .json(&json!({ "embedding": [1.0, 0.0] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "dimension_mismatch");
}

#[tokio::test]
async fn test_reingest_replaces_embedding() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({ "title": "A" })).await;
    let b = ingest_id(&base_url, vec![0.0, 1.0, 0.0, 0.0], json!({ "title": "B" })).await;

    let created_at = client()
        .get(format!("{}/songs/{}", base_url, b))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()["metadata"]["created_at"]
        .clone();

    let resp = client()
        .put(format!("{}/songs/{}", base_url, b))
        .json(&json!({ "embedding": [0.99, 0.01, 0.0, 0.0], "metadata": { "title": "B2" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["metadata"]["title"], "B2");
    assert_eq!(body["metadata"]["created_at"], created_at);

    let resp = client()
        .post(format!("{}/search", base_url))
        .json(&json!({ "embedding": [1.0, 0.0, 0.0, 0.0], "top_k": 5 }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(result_ids(&body), vec![a, b]);
}

#[tokio::test]
async fn test_reingest_unknown_song() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .put(format!("{}/songs/{}", base_url, uuid::Uuid::new_v4()))
        .json(&json!({ "embedding": [1.0, 0.0, 0.0, 0.0] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_song() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({})).await;
    let b = ingest_id(&base_url, vec![0.9, 0.1, 0.0, 0.0], json!({})).await;

    let resp = client()
        .delete(format!("{}/songs/{}", base_url, b))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client()
        .get(format!("{}/songs/{}", base_url, b))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client()
        .get(format!("{}/songs/{}/similar", base_url, a))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(result_ids(&body).is_empty());

    let resp = client()
        .delete(format!("{}/songs/{}", base_url, b))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_endpoints() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({})).await;
    ingest_id(&base_url, vec![0.0, 1.0, 0.0, 0.0], json!({})).await;

    let resp = client()
        .post(format!("{}/admin/reconcile", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["inserted"], 0);
    assert_eq!(body["removed"], 0);

    let resp = client()
        .post(format!("{}/admin/rebuild", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["indexed"], 2);

    let resp = client()
        .post(format!("{}/admin/checkpoint", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["records"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .get(format!("{}/metrics", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_header() {
    let base_url = spawn_ephemeral(4, IndexKind::Hnsw).await;
    let resp = client()
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    let request_id = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

#[tokio::test]
async fn test_songs_survive_restart() {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");

    let engine = Arc::new(Engine::open(EngineConfig::durable(4, tmp_dir.path())).unwrap());
    let base_url = spawn_app(engine.clone()).await;
    let a = ingest_id(&base_url, vec![1.0, 0.0, 0.0, 0.0], json!({ "title": "A" })).await;
    let b = ingest_id(&base_url, vec![0.9, 0.1, 0.0, 0.0], json!({ "title": "B" })).await;
    let before: Value = client()
        .get(format!("{}/songs/{}/similar", base_url, a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    engine.close().unwrap();

    let reopened = Arc::new(Engine::open(EngineConfig::durable(4, tmp_dir.path())).unwrap());
    let base_url = spawn_app(reopened).await;
    let resp = client()
        .get(format!("{}/songs/{}", base_url, b))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["metadata"]["title"], "B");

    let after: Value = client()
        .get(format!("{}/songs/{}/similar", base_url, a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result_ids(&before), result_ids(&after));
    assert_eq!(result_ids(&after), vec![b]);
}
