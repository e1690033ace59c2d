//! Black-box tests against the real HTTP surface: the router is served on an
//! ephemeral port and exercised with a plain HTTP client, including the
//! polling controller a real consumer would use.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::watch;

use longrun_api::app::build_app;
use longrun_poller::{HttpStatusSource, PollOutcome, Poller, PollerConfig};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = build_app();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn fast_poller_config() -> PollerConfig {
    PollerConfig {
        base_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(50),
        retry_delay: Duration::from_millis(10),
        ..PollerConfig::default()
    }
}

fn foreground() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(true);
    std::mem::forget(tx);
    rx
}

async fn submit(
    client: &reqwest::Client,
    base_url: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let res = client
        .post(format!("{}/tasks", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get_status(
    client: &reqwest::Client,
    base_url: &str,
    id: &str,
) -> (StatusCode, serde_json::Value) {
    let res = client
        .get(format!("{}/tasks/{}", base_url, id))
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = if status == StatusCode::NOT_FOUND {
        res.json().await.unwrap_or(json!({}))
    } else {
        res.json().await.unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_endpoint_responds() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unsupported_type_is_rejected_with_supported_list() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = submit(
        &client,
        &server.base_url,
        json!({"type": "report.monthly", "input": {}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_task_type");
    assert!(body["supported_types"]
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t == "demo.*"));
}

#[tokio::test]
async fn submission_returns_before_work_finishes() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let started = std::time::Instant::now();
    let (status, body) = submit(
        &client,
        &server.base_url,
        json!({
            "type": "demo.simulate",
            "input": {"steps": 4, "step_delay_ms": 500},
        }),
    )
    .await;
    let elapsed = started.elapsed();

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    let id = body["id"].as_str().unwrap();
    assert_eq!(body["polling_url"], format!("/tasks/{}", id));
    // The response must not wait on the 2s of simulated work.
    assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);

    let (status, snapshot) = get_status(&client, &server.base_url, id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["continue_poll"], true);
}

#[tokio::test]
async fn unknown_and_invalid_ids_are_distinguished() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let unknown = uuid::Uuid::now_v7();
    let (status, body) = get_status(&client, &server.base_url, &unknown.to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let res = client
        .get(format!("{}/tasks/not-a-uuid", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Omitting the id entirely is also a validation error.
    let res = client
        .get(format!("{}/tasks", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn full_roundtrip_submit_poll_consume() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = submit(
        &client,
        &server.base_url,
        json!({
            "type": "demo.simulate",
            "input": {"steps": 3, "step_delay_ms": 10, "result": {"answer": 42}},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id: longrun_core::TaskId = body["id"].as_str().unwrap().parse().unwrap();

    // Poll exactly the way a real consumer does.
    let source = Arc::new(HttpStatusSource::new(server.base_url.clone()));
    let handle = Poller::start(source, id, fast_poller_config(), foreground());
    let outcome = handle.join().await.unwrap();

    let snapshot = match outcome {
        PollOutcome::Completed(snapshot) => snapshot,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(snapshot.result, Some(json!({"answer": 42})));
    assert_eq!(snapshot.progress.percentage, 100);
    assert_eq!(snapshot.progress.steps.len(), 3);

    // Acknowledge the result.
    let res = client
        .post(format!("{}/tasks/{}/consume", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let consumed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(consumed["status"], "consumed");

    // Consuming twice is an illegal transition.
    let res = client
        .post(format!("{}/tasks/{}/consume", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // The record survives consumption until a sweep removes it.
    let (status, snapshot) = get_status(&client, &server.base_url, &id.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "consumed");
    assert_eq!(snapshot["continue_poll"], false);
}

#[tokio::test]
async fn failed_task_reports_error_via_poller() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = submit(
        &client,
        &server.base_url,
        json!({
            "type": "demo.simulate",
            "input": {"steps": 3, "step_delay_ms": 10, "fail_at_step": 1},
            "max_retries": 0,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id: longrun_core::TaskId = body["id"].as_str().unwrap().parse().unwrap();

    let source = Arc::new(HttpStatusSource::new(server.base_url.clone()));
    let handle = Poller::start(source, id, fast_poller_config(), foreground());

    match handle.join().await.unwrap() {
        PollOutcome::Failed(snapshot) => {
            let error = snapshot.error.expect("failed task carries an error");
            assert!(!error.retryable);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn cancellation_stops_the_executor_at_a_step_boundary() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = submit(
        &client,
        &server.base_url,
        json!({
            "type": "demo.simulate",
            "input": {"steps": 20, "step_delay_ms": 50},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/tasks/{}/cancel", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled: serde_json::Value = res.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");

    // The executor observes the flag at the next boundary and stops; the
    // status stays cancelled.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let (status, snapshot) = get_status(&client, &server.base_url, &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "cancelled");
    assert_eq!(snapshot["continue_poll"], false);

    // Cancelling a terminal task is rejected.
    let res = client
        .post(format!("{}/tasks/{}/cancel", server.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cleanup_dry_run_reports_without_deleting() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let (status, body) = submit(
            &client,
            &server.base_url,
            json!({
                "type": "demo.simulate",
                "input": {"steps": 1, "step_delay_ms": 5},
            }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    // Wait for both to finish so deletion is not racing the executor.
    for id in &ids {
        let task_id: longrun_core::TaskId = id.parse().unwrap();
        let source = Arc::new(HttpStatusSource::new(server.base_url.clone()));
        let handle = Poller::start(source, task_id, fast_poller_config(), foreground());
        assert!(matches!(
            handle.join().await.unwrap(),
            PollOutcome::Completed(_)
        ));
    }

    let res = client
        .delete(format!(
            "{}/tasks?mode=all&pattern=demo.*&dry_run=true",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["deleted_count"], 0);
    assert_eq!(report["candidates"].as_array().unwrap().len(), 2);

    // Dry run deleted nothing.
    let (status, _) = get_status(&client, &server.base_url, &ids[0]).await;
    assert_eq!(status, StatusCode::OK);

    let res = client
        .delete(format!("{}/tasks?mode=all&pattern=demo.*", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["deleted_count"], 2);

    for id in &ids {
        let (status, _) = get_status(&client, &server.base_url, id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn cleanup_accepts_pattern_mode() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, _) = submit(
        &client,
        &server.base_url,
        json!({
            "type": "demo.simulate",
            "input": {"steps": 1, "step_delay_ms": 5},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let res = client
        .delete(format!(
            "{}/tasks?mode=pattern&pattern=demo.*&dry_run=true",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["deleted_count"], 0);
    assert_eq!(report["candidates"].as_array().unwrap().len(), 1);

    // A pattern sweep without a pattern is a validation error, not a crash.
    let res = client
        .delete(format!("{}/tasks?mode=pattern", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orphan_sweep_ignores_fresh_records() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, _) = submit(
        &client,
        &server.base_url,
        json!({
            "type": "demo.simulate",
            "input": {"steps": 1, "step_delay_ms": 5},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Default orphan cutoff is far in the past relative to a fresh record.
    let res = client
        .delete(format!("{}/tasks?mode=orphaned", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["deleted_count"], 0);
}
