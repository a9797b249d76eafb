//! API Integration Tests for Harvester
//!
//! Runs the real router on a random port against a local upstream stub and
//! drives it over HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use harvester::server::{AppState, create_router};
use harvester::{
    CollectionSupervisor, CursorTracker, HttpSource, SourceConfig, StorageBuilder, StorageHandles,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

const TICK: Duration = Duration::from_millis(50);

// =============================================================================
// Test Helpers
// =============================================================================

/// Start the upstream stub and return its base URL.
///
/// - `/feed`: `{"v": n}` with n counting from 1
/// - `/broken`: always 500
async fn start_upstream() -> String {
    let counter = Arc::new(AtomicU64::new(0));
    let app = axum::Router::new()
        .route(
            "/feed",
            get(|State(counter): State<Arc<AtomicU64>>| async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Json(json!({ "v": n }))
            }),
        )
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
        )
        .with_state(counter);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

struct TestServer {
    base_url: String,
    supervisor: Arc<CollectionSupervisor>,
    handles: StorageHandles,
}

impl TestServer {
    async fn shutdown(self) {
        self.supervisor.shutdown().await;
        self.handles.shutdown().await.unwrap();
    }
}

/// Start the service against `upstream_path` on a fresh upstream stub.
async fn start_test_server(upstream_path: &str) -> TestServer {
    let upstream = start_upstream().await;
    let config = SourceConfig::new(format!("{}{}", upstream, upstream_path))
        .with_interval(TICK)
        .with_timeout(Duration::from_secs(2));

    let handles = StorageBuilder::new("sqlite::memory:")
        .channel_capacity(100)
        .build()
        .await
        .expect("Failed to build storage");

    let supervisor = Arc::new(CollectionSupervisor::new(
        Arc::new(HttpSource::new(&config).expect("Failed to build source")),
        handles.writer.clone(),
        config.interval,
    ));
    let router = create_router(AppState {
        supervisor: Arc::clone(&supervisor),
        cursor: Arc::new(CursorTracker::new(handles.reader.clone())),
        reader: handles.reader.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        supervisor,
        handles,
    }
}

async fn get_json(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.get(url).send().await.expect("request failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("body is not JSON"))
}

async fn post_json(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.post(url).send().await.expect("request failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("body is not JSON"))
}

// =============================================================================
// Collection Lifecycle
// =============================================================================

#[tokio::test]
async fn test_group_collects_in_order_and_stops() {
    let server = start_test_server("/feed").await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let (status, body) = post_json(&client, format!("{}/start/3", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "collecting");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = get_json(&client, format!("{}/all/3", base)).await;
            if body["total_count"].as_u64().unwrap() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("two ticks should be collected");

    assert!(server.supervisor.stop_and_wait(3).await);

    let (_, body) = get_json(&client, format!("{}/all/3", base)).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data[0]["data"], json!({"v": 1}));
    assert_eq!(data[1]["data"], json!({"v": 2}));
    let settled = data.len();

    tokio::time::sleep(TICK * 4).await;
    let (_, body) = get_json(&client, format!("{}/all/3", base)).await;
    assert_eq!(body["total_count"].as_u64().unwrap() as usize, settled);

    let (_, body) = get_json(&client, format!("{}/status/3", base)).await;
    assert_eq!(body["is_collecting"], false);
    assert_eq!(body["status"], "stopped");

    server.shutdown().await;
}

#[tokio::test]
async fn test_failing_upstream_keeps_group_collecting() {
    let server = start_test_server("/broken").await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let (_, body) = post_json(&client, format!("{}/start/5", base)).await;
    assert_eq!(body["status"], "collecting");

    for _ in 0..3 {
        tokio::time::sleep(TICK).await;
        let (_, body) = get_json(&client, format!("{}/status/5", base)).await;
        assert_eq!(body["is_collecting"], true);
        assert_eq!(body["total_records"], 0);
    }

    let (_, body) = get_json(&client, format!("{}/all/5", base)).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = post_json(&client, format!("{}/stop/5", base)).await;
    assert_eq!(body["status"], "stopped");

    server.shutdown().await;
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let server = start_test_server("/broken").await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let (_, body) = post_json(&client, format!("{}/start", base)).await;
    assert_eq!(body["group_id"], 1);
    assert_eq!(body["status"], "collecting");
    let (_, body) = post_json(&client, format!("{}/start/1", base)).await;
    assert_eq!(body["status"], "already_collecting");

    let (_, body) = get_json(&client, format!("{}/status", base)).await;
    assert_eq!(body["collecting_groups"]["1"], true);
    assert_eq!(body["collecting_groups"]["2"], false);

    let (_, body) = post_json(&client, format!("{}/stop/1", base)).await;
    assert_eq!(body["status"], "stopped");
    let (_, body) = post_json(&client, format!("{}/stop", base)).await;
    assert_eq!(body["status"], "already_stopped");

    server.shutdown().await;
}

// =============================================================================
// One-shot Collection
// =============================================================================

#[tokio::test]
async fn test_collect_against_failing_upstream() {
    let server = start_test_server("/broken").await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let (status, body) = post_json(&client, format!("{}/collect", base)).await;
    assert_eq!(status, 500);
    assert!(body["detail"].as_str().unwrap().contains("500"));

    let (_, body) = get_json(&client, format!("{}/all/1", base)).await;
    assert_eq!(body["total_count"], 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_collect_then_read_round_robin() {
    let server = start_test_server("/feed").await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let (status, _) = get_json(&client, format!("{}/current", base)).await;
    assert_eq!(status, 404);

    for expected in 1..=3 {
        let (status, body) = post_json(&client, format!("{}/collect", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["data"], json!({"v": expected}));
    }

    let mut seen = Vec::new();
    for _ in 0..4 {
        let (status, body) = get_json(&client, format!("{}/current/1", base)).await;
        assert_eq!(status, 200);
        seen.push(body["current_data"]["data"]["v"].as_u64().unwrap());
    }
    assert_eq!(seen, vec![1, 2, 3, 1]);

    let (_, body) = get_json(&client, format!("{}/stats", base)).await;
    assert_eq!(body["total_records"], 3);
    assert_eq!(body["available_groups"], json!([1]));
    assert_eq!(body["current_indexes"], json!({"1": 1}));

    let (_, body) = get_json(&client, format!("{}/groups", base)).await;
    assert_eq!(body["group_details"][0]["total_records"], 3);
    assert_eq!(body["group_details"][0]["current_index"], 1);
    assert!(body["group_details"][0]["latest_record"].is_string());

    server.shutdown().await;
}

// =============================================================================
// Request Validation
// =============================================================================

#[tokio::test]
async fn test_rejects_non_positive_group() {
    let server = start_test_server("/feed").await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let (status, body) = post_json(&client, format!("{}/start/0", base)).await;
    assert_eq!(status, 400);
    assert!(body["detail"].is_string());
    assert!(!server.supervisor.is_active(0).await);

    let resp = client
        .get(format!("{}/current/abc", base))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 400);

    server.shutdown().await;
}
