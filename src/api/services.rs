use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::warn;
use uuid::Uuid;

use super::{
    models::{CancelResponse, ProbeRequest, TaskAcceptedResponse, TaskStatusResponse},
    state::AppState,
    validation::RequestValidationError,
};
use crate::api::error::ApiError;
use crate::tasks::{CombineRequest, DownloadRequest, TaskRequest, TaskStatus};

// Submission payloads are a handful of format descriptors, never media.
const MAX_PAYLOAD_SIZE: usize = 1024 * 1024; // 1MB

/// Format discovery endpoint (POST /api/probe)
///
/// Runs the probe tool against the given url and returns the classified
/// format catalog together with the source title, duration, and uploader.
/// Probe failures map to 502 since the upstream site is the one refusing.
pub async fn probe_media(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: ProbeRequest = decode_payload(&headers, body).await?;
    super::validation::validate_probe(&request).map_err(map_validation_error)?;

    let probe = state
        .tool
        .probe(&request.url)
        .await
        .map_err(|e| ApiError::ProbeFailed(e.to_string()))?;

    Ok((StatusCode::OK, Json(probe)))
}

/// Primary download submission endpoint (POST /api/tasks/download)
///
/// This is the main entry point for single-stream work. It handles:
/// - Content-Type and payload validation
/// - Task record creation in the in-memory store
/// - Queue handoff to the task runner
///
/// ## Flow:
/// 1. Validate headers (Content-Type must be application/json)
/// 2. Read the body, enforce size limits, deserialize the request
/// 3. Validate url, format id, and container extensions
/// 4. Create the task record (Queued status, time-sortable UUIDv7 id)
/// 5. Push the id onto the work queue; a closed queue fails the task
/// 6. Return 202 Accepted with the task_id and its polling URL
///
/// The response arrives before any work happens. Clients poll
/// `GET /api/tasks/{task_id}` to follow progress and fetch the result
/// once the status turns `completed`.
pub async fn submit_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: DownloadRequest = decode_payload(&headers, body).await?;
    super::validation::validate_download(&request).map_err(map_validation_error)?;

    let task_id = state.store.create(TaskRequest::Download(request));
    enqueue(&state, task_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAcceptedResponse::queued(task_id)),
    ))
}

/// Combine submission endpoint (POST /api/tasks/combine)
///
/// Same contract as download submission, but the task fetches separate
/// video and audio streams and merges them into a single mp4.
pub async fn submit_combine(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: CombineRequest = decode_payload(&headers, body).await?;
    super::validation::validate_combine(&request).map_err(map_validation_error)?;

    let task_id = state.store.create(TaskRequest::Combine(request));
    enqueue(&state, task_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAcceptedResponse::queued(task_id)),
    ))
}

/// Task status endpoint (GET /api/tasks/{task_id})
///
/// Returns the current snapshot for a given task_id.
/// Includes status, phase, progress, timestamps, and failure detail.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .store
        .get(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id}")))?;

    Ok((StatusCode::OK, Json(TaskStatusResponse::from(&task))))
}

/// Cancellation endpoint (POST /api/tasks/{task_id}/cancel)
///
/// Flags the task and fires its cancellation token; the runner honors the
/// flag at its next checkpoint. Cancelling a task that already reached a
/// terminal state is a no-op reported as `already_terminal`.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.store.request_cancel(&task_id)?;
    let status = state
        .store
        .get(&task_id)
        .map(|task| task.status)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id}")))?;

    Ok((
        StatusCode::OK,
        Json(CancelResponse {
            task_id,
            outcome,
            status,
        }),
    ))
}

/// Result download endpoint (GET /api/tasks/{task_id}/result)
///
/// Streams the finished artifact with a browser-friendly filename. Serving
/// is strict about lifecycle: non-completed tasks get 409, and completed
/// tasks whose artifact was already swept by retention get 410.
pub async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let task = state
        .store
        .get(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id}")))?;

    if task.status != TaskStatus::Completed {
        return Err(ApiError::ResultNotReady(format!(
            "task {} is {}",
            task_id, task.status
        )));
    }

    let path = task.result_ref.clone().ok_or_else(|| {
        ApiError::Internal(format!("completed task {} has no artifact", task_id))
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_string();

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::ResultGone(format!("task {task_id}")));
        }
        Err(err) => {
            return Err(ApiError::Internal(format!(
                "failed to open artifact: {}",
                err
            )));
        }
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to stat artifact: {}", e)))?
        .len();

    let filename = super::utils::result_filename(&task, &ext);
    let content_type = super::utils::content_type_for(&ext);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Health check endpoint (GET /health)
///
/// Returns health status of all MediaBox components:
/// - api: Axum HTTP server
/// - task_store: in-memory task registry
/// - task_queue: channel to the task runner
/// - artifact_dir: published artifact directory
///
/// Returns 503 Service Unavailable if any component is unhealthy.
/// Returns 200 OK otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("task_store".to_string(), "healthy".to_string());

    let queue_status = if state.queue.is_open() {
        "healthy"
    } else {
        "unhealthy"
    };
    components.insert("task_queue".to_string(), queue_status.to_string());

    let artifact_dir_ok = tokio::fs::metadata(&state.config.engine.artifact_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    let artifact_status = if artifact_dir_ok { "healthy" } else { "unhealthy" };
    components.insert("artifact_dir".to_string(), artifact_status.to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let overall_status = if all_healthy { "healthy" } else { "unhealthy" };

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = super::models::HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}

/// Maps request validation errors to API errors
fn map_validation_error(err: RequestValidationError) -> ApiError {
    ApiError::InvalidPayload(err.to_string())
}

/// Checks the Content-Type header, reads the body, and deserializes it
async fn decode_payload<T: serde::de::DeserializeOwned>(
    headers: &HeaderMap,
    body: Body,
) -> Result<T, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let bytes = axum::body::to_bytes(body, MAX_PAYLOAD_SIZE)
        .await
        .map_err(|err| ApiError::InvalidPayload(format!("failed to read body: {}", err)))?;

    Ok(serde_json::from_slice(&bytes)?)
}

/// Hands a created task to the runner, failing the record if the queue is closed.
async fn enqueue(state: &AppState, task_id: Uuid) -> Result<(), ApiError> {
    if let Err(err) = state.queue.push(task_id).await {
        warn!(task_id = %task_id, error = %err, "Failed to enqueue task");
        let _ = state
            .store
            .fail(&task_id, "task executor unavailable".to_string());
        return Err(ApiError::Internal("task queue closed".to_string()));
    }
    state.metrics.task_submitted();
    Ok(())
}
