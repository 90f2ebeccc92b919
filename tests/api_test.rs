use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use mediabox::api::models::{CancelResponse, TaskAcceptedResponse, TaskStatusResponse};
use mediabox::api::router;
use mediabox::api::state::AppState;
use mediabox::config::Config;
use mediabox::mediatool::{FormatOption, MediaProbe, MediaTool, ScriptStep, ScriptedTool};
use mediabox::observability::Metrics;
use mediabox::tasks::{CancelOutcome, TaskStatus, TaskStore};
use mediabox::worker::{TaskRunner, WorkDirs, task_queue};

/// Creates a minimal config for testing
/// We bypass file-based loading and parse an inline document so the
/// engine paths land inside the per-test temp directory
fn create_test_config(temp_dir: &TempDir) -> Config {
    let config_toml = format!(
        r#"
[server]
bind_addr = "127.0.0.1:0"

[engine]
work_dir = "{}"
artifact_dir = "{}"
queue_capacity = 16

[retention]
artifact_ttl = "1h"
sweep_interval = "10m"
"#,
        temp_dir.path().join("work").display(),
        temp_dir.path().join("artifacts").display()
    );

    toml::from_str(&config_toml).expect("Failed to parse test config")
}

/// Builds a test app with isolated dependencies and a scripted tool
async fn build_test_app(tool: ScriptedTool) -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let work_dir = temp_dir.path().join("work");
    let artifact_dir = temp_dir.path().join("artifacts");
    std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");
    std::fs::create_dir_all(&artifact_dir).expect("Failed to create artifact dir");

    let config = create_test_config(&temp_dir);
    let store = Arc::new(TaskStore::new());
    let tool: Arc<dyn MediaTool> = Arc::new(tool);
    let (queue, receiver) = task_queue(16);

    // Same wiring as the real bootstrap, minus the retention sweeper
    let runner = TaskRunner::new(
        store.clone(),
        tool.clone(),
        WorkDirs {
            work_dir,
            artifact_dir,
        },
        Arc::new(Metrics::new()),
    );
    tokio::spawn(runner.run(receiver));

    let state = AppState::new(config, store, queue, tool);
    (router(state), temp_dir)
}

fn download_payload() -> serde_json::Value {
    json!({
        "url": "https://example.com/watch?v=abc",
        "format_id": "140",
        "title": "Test Clip",
        "format": { "ext": "m4a", "abr": 128.0 }
    })
}

fn combine_payload() -> serde_json::Value {
    json!({
        "url": "https://example.com/watch?v=abc",
        "title": "Test Clip",
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

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

async fn submit(app: &Router, uri: &str, payload: &serde_json::Value) -> TaskAcceptedResponse {
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), post_json(uri, payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn poll_status(app: &Router, task_id: Uuid) -> TaskStatusResponse {
    let request = get_request(&format!("/api/tasks/{}", task_id));
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_for_terminal(app: &Router, task_id: Uuid) -> TaskStatusResponse {
    for _ in 0..500 {
        let status = poll_status(app, task_id).await;
        if status.status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

async fn wait_for_processing(app: &Router, task_id: Uuid) -> TaskStatusResponse {
    for _ in 0..500 {
        let status = poll_status(app, task_id).await;
        if status.status == TaskStatus::Processing {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task never started processing");
}

#[tokio::test]
async fn test_submit_download_accepted() {
    let (app, _temp_dir) =
        build_test_app(ScriptedTool::new(vec![ScriptStep::Progress(vec![100.0])])).await;

    let accepted = submit(&app, "/api/tasks/download", &download_payload()).await;
    assert_eq!(accepted.status, TaskStatus::Queued);
    assert_eq!(
        accepted.status_url,
        format!("/api/tasks/{}", accepted.task_id)
    );

    let status = wait_for_terminal(&app, accepted.task_id).await;
    assert_eq!(status.status, TaskStatus::Completed);
    assert_eq!(status.progress_percent, 100.0);
    assert!(status.result_ready);
    assert!(status.completed_at.is_some());
    assert_eq!(status.title, "Test Clip");
}

#[tokio::test]
async fn test_submit_combine_accepted() {
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(vec![
        ScriptStep::Progress(vec![50.0, 100.0]),
        ScriptStep::Progress(vec![100.0]),
        ScriptStep::Progress(vec![80.0]),
    ]))
    .await;

    let accepted = submit(&app, "/api/tasks/combine", &combine_payload()).await;
    let status = wait_for_terminal(&app, accepted.task_id).await;
    assert_eq!(status.status, TaskStatus::Completed);
    assert_eq!(status.phase.to_string(), "combining");
    assert!(status.result_ready);
}

#[tokio::test]
async fn test_submit_rejects_invalid_payload() {
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(Vec::new())).await;

    // Missing required url field
    let response = ServiceExt::<Request<Body>>::oneshot(
        app.clone(),
        post_json(
            "/api/tasks/download",
            &json!({ "format_id": "140", "format": { "ext": "m4a" } }),
        ),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unsupported url scheme
    let mut payload = download_payload();
    payload["url"] = json!("ftp://example.com/file");
    let response =
        ServiceExt::<Request<Body>>::oneshot(app.clone(), post_json("/api/tasks/download", &payload))
            .await
            .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Extension that could escape the scratch directory
    let mut payload = download_payload();
    payload["format"]["ext"] = json!("../etc");
    let response =
        ServiceExt::<Request<Body>>::oneshot(app, post_json("/api/tasks/download", &payload))
            .await
            .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_rejects_wrong_content_type() {
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(Vec::new())).await;

    let request = Request::builder()
        .uri("/api/tasks/download")
        .method("POST")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(
            serde_json::to_string(&download_payload()).unwrap(),
        ))
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .uri("/api/tasks/download")
        .method("POST")
        .body(Body::from(
            serde_json::to_string(&download_payload()).unwrap(),
        ))
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_lifecycle_to_result() {
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(vec![ScriptStep::Progress(vec![
        25.0, 60.0, 100.0,
    ])]))
    .await;

    let accepted = submit(&app, "/api/tasks/download", &download_payload()).await;
    let status = wait_for_terminal(&app, accepted.task_id).await;
    assert_eq!(status.status, TaskStatus::Completed);

    let request = get_request(&format!("/api/tasks/{}/result", accepted.task_id));
    let response = ServiceExt::<Request<Body>>::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert_eq!(content_type, "audio/mp4");

    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"Test Clip (128kbps) ["));
    assert!(disposition.ends_with(".m4a\""));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"scripted media");
}

#[tokio::test]
async fn test_result_conflict_while_processing() {
    let (app, _temp_dir) =
        build_test_app(ScriptedTool::new(vec![ScriptStep::BlockUntilCancelled])).await;

    let accepted = submit(&app, "/api/tasks/download", &download_payload()).await;
    wait_for_processing(&app, accepted.task_id).await;

    let request = get_request(&format!("/api/tasks/{}/result", accepted.task_id));
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Cancel so the blocked tool call winds down
    let request = Request::builder()
        .uri(format!("/api/tasks/{}/cancel", accepted.task_id))
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let cancel: CancelResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(cancel.outcome, CancelOutcome::Accepted);

    let status = wait_for_terminal(&app, accepted.task_id).await;
    assert_eq!(status.status, TaskStatus::Cancelled);
    assert!(!status.result_ready);
}

#[tokio::test]
async fn test_cancel_after_completion_reports_already_terminal() {
    let (app, _temp_dir) =
        build_test_app(ScriptedTool::new(vec![ScriptStep::Progress(vec![100.0])])).await;

    let accepted = submit(&app, "/api/tasks/download", &download_payload()).await;
    wait_for_terminal(&app, accepted.task_id).await;

    let request = Request::builder()
        .uri(format!("/api/tasks/{}/cancel", accepted.task_id))
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let cancel: CancelResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(cancel.outcome, CancelOutcome::AlreadyTerminal);
    assert_eq!(cancel.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_unknown_task_returns_not_found() {
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(Vec::new())).await;
    let unknown = Uuid::new_v4();

    let response = ServiceExt::<Request<Body>>::oneshot(
        app.clone(),
        get_request(&format!("/api/tasks/{}", unknown)),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ServiceExt::<Request<Body>>::oneshot(
        app.clone(),
        get_request(&format!("/api/tasks/{}/result", unknown)),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .uri(format!("/api/tasks/{}/cancel", unknown))
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A malformed id never reaches the store
    let response =
        ServiceExt::<Request<Body>>::oneshot(app, get_request("/api/tasks/not-a-uuid"))
            .await
            .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_probe_returns_catalog() {
    let probe = MediaProbe {
        title: Some("Test Clip".to_string()),
        duration_secs: Some(213.0),
        uploader: Some("Test Channel".to_string()),
        formats: mediabox::mediatool::FormatCatalog {
            combined: vec![FormatOption {
                format_id: "22".to_string(),
                ext: "mp4".to_string(),
                quality: "720p".to_string(),
                height: Some(720),
                abr: None,
                filesize: Some("12.3MB".to_string()),
            }],
            video_only: Vec::new(),
            audio_only: vec![FormatOption {
                format_id: "140".to_string(),
                ext: "m4a".to_string(),
                quality: "129kbps".to_string(),
                height: None,
                abr: Some(129.5),
                filesize: None,
            }],
            other: Vec::new(),
        },
    };
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(Vec::new()).with_probe(probe)).await;

    let response = ServiceExt::<Request<Body>>::oneshot(
        app.clone(),
        post_json("/api/probe", &json!({ "url": "https://example.com/watch?v=abc" })),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let catalog: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        catalog.get("title").and_then(|v| v.as_str()),
        Some("Test Clip")
    );
    assert_eq!(
        catalog["formats"]["combined"][0]["quality"].as_str(),
        Some("720p")
    );
    assert_eq!(
        catalog["formats"]["audio_only"][0]["format_id"].as_str(),
        Some("140")
    );

    // Probing a non-http url is rejected before the tool runs
    let response = ServiceExt::<Request<Body>>::oneshot(
        app,
        post_json("/api/probe", &json!({ "url": "file:///etc/passwd" })),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _temp_dir) = build_test_app(ScriptedTool::new(Vec::new())).await;

    let response = ServiceExt::<Request<Body>>::oneshot(app, get_request("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(
        health.get("status").and_then(|v| v.as_str()),
        Some("healthy")
    );
    assert!(health.get("version").is_some());

    let components = health.get("components").unwrap().as_object().unwrap();
    assert!(components.contains_key("api"));
    assert!(components.contains_key("task_store"));
    assert!(components.contains_key("task_queue"));
    assert!(components.contains_key("artifact_dir"));

    let metrics = health.get("metrics").unwrap().as_object().unwrap();
    assert!(metrics.contains_key("tasks_submitted"));
    assert!(metrics.contains_key("artifacts_pruned"));
}
