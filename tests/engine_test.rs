//! End-to-end checks of the task engine semantics: phase progression,
//! cancellation checkpoints, partial discard, retention, and the polling
//! client against a live server.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use mediabox::api::models::{TaskAcceptedResponse, TaskStatusResponse};
use mediabox::api::router;
use mediabox::api::state::AppState;
use mediabox::client::{ClientError, PollOutcome, StatusPoller};
use mediabox::config::{ClientConfig, Config, HumanDuration};
use mediabox::mediatool::{MediaTool, ScriptStep, ScriptedTool};
use mediabox::observability::Metrics;
use mediabox::tasks::{TaskStatus, TaskStore};
use mediabox::worker::{TaskRunner, WorkDirs, task_queue};

struct Harness {
    app: Router,
    artifact_dir: PathBuf,
    _temp: TempDir,
}

async fn build_harness(steps: Vec<ScriptStep>) -> Harness {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let work_dir = temp.path().join("work");
    let artifact_dir = temp.path().join("artifacts");
    std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");
    std::fs::create_dir_all(&artifact_dir).expect("Failed to create artifact dir");

    let config_toml = format!(
        r#"
[engine]
work_dir = "{}"
artifact_dir = "{}"
"#,
        work_dir.display(),
        artifact_dir.display()
    );
    let config: Config = toml::from_str(&config_toml).expect("Failed to parse test config");

    let store = Arc::new(TaskStore::new());
    let tool: Arc<dyn MediaTool> = Arc::new(ScriptedTool::new(steps));
    let (queue, receiver) = task_queue(16);

    let runner = TaskRunner::new(
        store.clone(),
        tool.clone(),
        WorkDirs {
            work_dir,
            artifact_dir: artifact_dir.clone(),
        },
        Arc::new(Metrics::new()),
    );
    tokio::spawn(runner.run(receiver));

    let state = AppState::new(config, store, queue, tool);
    Harness {
        app: router(state),
        artifact_dir,
        _temp: temp,
    }
}

fn download_payload() -> serde_json::Value {
    json!({
        "url": "https://example.com/watch?v=abc",
        "format_id": "140",
        "title": "Engine Clip",
        "format": { "ext": "m4a", "abr": 128.0 }
    })
}

fn convert_payload() -> serde_json::Value {
    json!({
        "url": "https://example.com/watch?v=abc",
        "format_id": "140",
        "title": "Engine Clip",
        "format": { "ext": "m4a", "abr": 128.0, "convert_to": "mp3" }
    })
}

fn combine_payload() -> serde_json::Value {
    json!({
        "url": "https://example.com/watch?v=abc",
        "title": "Engine Clip",
        "duration_secs": 213.0,
        "video_format": { "format_id": "137", "ext": "mp4", "height": 1080 },
        "audio_format": { "format_id": "140", "ext": "m4a", "abr": 129.5 }
    })
}

fn post_json(uri: &str, payload: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(payload).unwrap()))
        .unwrap()
}

async fn submit(app: &Router, uri: &str, payload: &serde_json::Value) -> Uuid {
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), post_json(uri, payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let accepted: TaskAcceptedResponse = serde_json::from_slice(&body).unwrap();
    accepted.task_id
}

async fn fetch_status(app: &Router, task_id: Uuid) -> TaskStatusResponse {
    let request = Request::builder()
        .uri(format!("/api/tasks/{}", task_id))
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_for_phase(app: &Router, task_id: Uuid, phase: &str) -> TaskStatusResponse {
    for _ in 0..500 {
        let status = fetch_status(app, task_id).await;
        if status.phase.to_string() == phase {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task never entered phase {}", phase);
}

async fn wait_for_terminal(app: &Router, task_id: Uuid) -> TaskStatusResponse {
    for _ in 0..500 {
        let status = fetch_status(app, task_id).await;
        if status.status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

async fn cancel(app: &Router, task_id: Uuid) {
    let request = Request::builder()
        .uri(format!("/api/tasks/{}/cancel", task_id))
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_percent_resets_when_phase_advances() {
    // Video fetch runs to 100, then the audio fetch blocks so the
    // freshly-entered phase can be observed
    let harness = build_harness(vec![
        ScriptStep::Progress(vec![40.0, 100.0]),
        ScriptStep::BlockUntilCancelled,
    ])
    .await;

    let task_id = submit(&harness.app, "/api/tasks/combine", &combine_payload()).await;
    let status = wait_for_phase(&harness.app, task_id, "downloading_audio").await;
    assert_eq!(status.status, TaskStatus::Processing);
    assert_eq!(status.progress_percent, 0.0);

    cancel(&harness.app, task_id).await;
    let status = wait_for_terminal(&harness.app, task_id).await;
    assert_eq!(status.status, TaskStatus::Cancelled);
    assert_eq!(status.message, "cancelled by request");
}

#[tokio::test]
async fn test_conversion_holds_percent_at_hundred() {
    // Conversion has no progress signal; the label flips while the
    // download's final percent stays put
    let harness = build_harness(vec![
        ScriptStep::Progress(vec![100.0]),
        ScriptStep::BlockUntilCancelled,
    ])
    .await;

    let task_id = submit(&harness.app, "/api/tasks/download", &convert_payload()).await;
    let status = wait_for_phase(&harness.app, task_id, "converting_mp3").await;
    assert_eq!(status.progress_percent, 100.0);

    cancel(&harness.app, task_id).await;
    wait_for_terminal(&harness.app, task_id).await;
}

#[tokio::test]
async fn test_failure_discards_partials_and_blocks_result() {
    let harness = build_harness(vec![
        ScriptStep::Progress(vec![100.0]),
        ScriptStep::Fail("network timeout after 3 retries".to_string()),
    ])
    .await;

    let task_id = submit(&harness.app, "/api/tasks/combine", &combine_payload()).await;
    let status = wait_for_terminal(&harness.app, task_id).await;
    assert_eq!(status.status, TaskStatus::Failed);
    assert!(status.message.contains("network timeout"));
    assert!(!status.result_ready);

    // The fetched video stream never leaks into the artifact directory
    let entries = std::fs::read_dir(&harness.artifact_dir).unwrap().count();
    assert_eq!(entries, 0);

    let request = Request::builder()
        .uri(format!("/api/tasks/{}/result", task_id))
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(harness.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_while_queued_short_circuits_at_dequeue() {
    // First task occupies the single runner so the second stays queued
    let harness = build_harness(vec![
        ScriptStep::BlockUntilCancelled,
        ScriptStep::Progress(vec![100.0]),
    ])
    .await;

    let blocker = submit(&harness.app, "/api/tasks/download", &download_payload()).await;
    let queued = submit(&harness.app, "/api/tasks/download", &download_payload()).await;

    // Cancel the second task before the runner ever dequeues it
    let status = fetch_status(&harness.app, queued).await;
    assert_eq!(status.status, TaskStatus::Queued);
    cancel(&harness.app, queued).await;

    // Unblock the runner; it reaps the first task, then short-circuits the second
    cancel(&harness.app, blocker).await;

    let status = wait_for_terminal(&harness.app, queued).await;
    assert_eq!(status.status, TaskStatus::Cancelled);
    assert_eq!(status.message, "cancelled before start");
    assert_eq!(status.phase.to_string(), "none");
    assert_eq!(status.progress_percent, 0.0);
}

#[tokio::test]
async fn test_result_gone_after_retention_sweep() {
    let harness = build_harness(vec![ScriptStep::Progress(vec![100.0])]).await;

    let task_id = submit(&harness.app, "/api/tasks/download", &download_payload()).await;
    let status = wait_for_terminal(&harness.app, task_id).await;
    assert_eq!(status.status, TaskStatus::Completed);

    // Give the artifact measurable age, then sweep with zero retention
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = mediabox::janitor::sweep_artifacts(&harness.artifact_dir, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(stats.removed, 1);
    assert!(stats.bytes_reclaimed > 0);

    // The record survives the sweep but the artifact does not
    let status = fetch_status(&harness.app, task_id).await;
    assert_eq!(status.status, TaskStatus::Completed);

    let request = Request::builder()
        .uri(format!("/api/tasks/{}/result", task_id))
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(harness.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

async fn spawn_server(app: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

fn fast_client_config(max_attempts: u32) -> ClientConfig {
    ClientConfig {
        queued_poll_interval: HumanDuration(Duration::from_millis(20)),
        processing_poll_interval: HumanDuration(Duration::from_millis(10)),
        max_attempts,
    }
}

#[tokio::test]
async fn test_poller_follows_task_to_completion() {
    let harness = build_harness(vec![ScriptStep::Progress(vec![30.0, 70.0, 100.0])]).await;
    let addr = spawn_server(harness.app.clone()).await;
    let base_url = format!("http://{}", addr);

    // Submit over real HTTP
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/tasks/download", base_url))
        .header("content-type", "application/json")
        .body(download_payload().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let raw = response.bytes().await.unwrap();
    let accepted: TaskAcceptedResponse = serde_json::from_slice(&raw).unwrap();

    let poller = StatusPoller::new(&base_url, &fast_client_config(200));
    match poller.wait(accepted.task_id).await.unwrap() {
        PollOutcome::Terminal(status) => {
            assert_eq!(status.status, TaskStatus::Completed);
            assert!(status.result_ready);
        }
        PollOutcome::TimedOut { attempts, .. } => {
            panic!("poller gave up after {} attempts", attempts)
        }
    }
}

#[tokio::test]
async fn test_poller_times_out_and_reports_unknown_tasks() {
    let harness = build_harness(vec![ScriptStep::BlockUntilCancelled]).await;
    let addr = spawn_server(harness.app.clone()).await;
    let base_url = format!("http://{}", addr);

    let task_id = submit(&harness.app, "/api/tasks/download", &download_payload()).await;

    // The task never settles, so a tiny attempt budget runs out
    let poller = StatusPoller::new(&base_url, &fast_client_config(3));
    match poller.wait(task_id).await.unwrap() {
        PollOutcome::TimedOut {
            attempts,
            last_seen,
        } => {
            assert_eq!(attempts, 3);
            let last = last_seen.expect("at least one poll should have succeeded");
            assert!(!last.status.is_terminal());
        }
        PollOutcome::Terminal(status) => panic!("unexpected terminal status {:?}", status.status),
    }

    // Unknown ids are definitive, not retried
    let err = poller.fetch_status(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));

    cancel(&harness.app, task_id).await;
    wait_for_terminal(&harness.app, task_id).await;
}
