//! Polling client for the task API.
//!
//! Drives `GET /api/tasks/{task_id}` until the task reaches a terminal
//! status. The poll cadence adapts to what the server reports: slow while
//! the task sits in the queue, fast once it is processing, and the loop
//! stops the moment a terminal status arrives. A bounded attempt budget
//! keeps a stuck server from pinning the client forever.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::models::TaskStatusResponse;
use crate::config::ClientConfig;
use crate::tasks::TaskStatus;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed status payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// How a polling session ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The task reached a terminal status
    Terminal(TaskStatusResponse),
    /// The attempt budget ran out first
    TimedOut {
        attempts: u32,
        last_seen: Option<TaskStatusResponse>,
    },
}

pub struct StatusPoller {
    http: reqwest::Client,
    base_url: String,
    queued_interval: Duration,
    processing_interval: Duration,
    max_attempts: u32,
}

impl StatusPoller {
    pub fn new(base_url: &str, config: &ClientConfig) -> Self {
        StatusPoller {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            queued_interval: config.queued_poll_interval.as_duration(),
            processing_interval: config.processing_poll_interval.as_duration(),
            max_attempts: config.max_attempts,
        }
    }

    fn status_url(&self, task_id: Uuid) -> String {
        format!("{}/api/tasks/{}", self.base_url, task_id)
    }

    fn interval_for(&self, status: TaskStatus) -> Duration {
        match status {
            TaskStatus::Processing => self.processing_interval,
            _ => self.queued_interval,
        }
    }

    /// One status fetch.
    pub async fn fetch_status(&self, task_id: Uuid) -> Result<TaskStatusResponse, ClientError> {
        let response = self.http.get(self.status_url(task_id)).send().await?;
        match response.status().as_u16() {
            200 => {
                let raw: Bytes = response.bytes().await?;
                Ok(serde_json::from_slice(&raw)?)
            }
            404 => Err(ClientError::NotFound(task_id)),
            other => Err(ClientError::UnexpectedStatus(other)),
        }
    }

    /// Poll until the task settles or the attempt budget runs out.
    ///
    /// Unknown task ids and undecodable payloads end the session; transport
    /// hiccups and 5xx responses just consume an attempt and retry.
    pub async fn wait(&self, task_id: Uuid) -> Result<PollOutcome, ClientError> {
        let mut last_seen: Option<TaskStatusResponse> = None;

        for _ in 0..self.max_attempts {
            match self.fetch_status(task_id).await {
                Ok(status) => {
                    let changed = last_seen
                        .as_ref()
                        .map(|prev| prev.status != status.status || prev.phase != status.phase)
                        .unwrap_or(true);
                    if changed {
                        info!(
                            task_id = %task_id,
                            status = %status.status,
                            phase = %status.phase,
                            percent = status.progress_percent,
                            "Task status"
                        );
                    }

                    if status.status.is_terminal() {
                        return Ok(PollOutcome::Terminal(status));
                    }

                    let interval = self.interval_for(status.status);
                    last_seen = Some(status);
                    sleep(interval).await;
                }
                Err(err @ ClientError::NotFound(_)) => return Err(err),
                Err(err @ ClientError::Decode(_)) => return Err(err),
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "Status poll failed, retrying");
                    sleep(self.queued_interval).await;
                }
            }
        }

        Ok(PollOutcome::TimedOut {
            attempts: self.max_attempts,
            last_seen,
        })
    }
}

/// Follow one task from the command line until it settles.
pub async fn watch(base_url: &str, task_id: Uuid, config: &ClientConfig) -> Result<(), AnyError> {
    let poller = StatusPoller::new(base_url, config);

    match poller.wait(task_id).await? {
        PollOutcome::Terminal(status) => match status.status {
            TaskStatus::Completed => {
                info!(
                    task_id = %task_id,
                    result = %format!("{}/api/tasks/{}/result", base_url.trim_end_matches('/'), task_id),
                    "Task completed"
                );
                Ok(())
            }
            TaskStatus::Cancelled => {
                info!(task_id = %task_id, message = %status.message, "Task cancelled");
                Ok(())
            }
            _ => Err(format!("task failed: {}", status.message).into()),
        },
        PollOutcome::TimedOut { attempts, .. } => {
            Err(format!("no terminal status after {} polls", attempts).into())
        }
    }
}
