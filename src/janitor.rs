//! Retention sweeper for the artifact directory.
//!
//! Finished artifacts stay on disk until their file age passes the
//! configured retention window, then a periodic sweep deletes them. Age is
//! judged from filesystem mtime, so retention survives process restarts
//! even though task records do not.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::observability::Metrics;

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    /// Regular files examined
    pub scanned: u64,
    /// Files deleted because their age exceeded retention
    pub removed: u64,
    /// Total size of the deleted files
    pub bytes_reclaimed: u64,
}

/// Delete artifacts older than `retention`.
///
/// A missing directory counts as empty. Files that vanish mid-sweep are
/// skipped, another actor already removed them.
pub async fn sweep_artifacts(dir: &Path, retention: Duration) -> io::Result<SweepStats> {
    let mut stats = SweepStats::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(stats),
        Err(err) => return Err(err),
    };

    while let Some(entry) = entries.next_entry().await? {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        stats.scanned += 1;

        // Files with unreadable or future mtimes are treated as fresh.
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| mtime.elapsed().ok())
            .unwrap_or(Duration::ZERO);
        if age <= retention {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path).await {
            Ok(()) => {
                stats.removed += 1;
                stats.bytes_reclaimed += metadata.len();
                debug!(path = %path.display(), "Removed expired artifact");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to remove expired artifact");
            }
        }
    }

    Ok(stats)
}

/// Sweep `dir` every `period` until the task is dropped.
pub async fn run(dir: std::path::PathBuf, retention: Duration, period: Duration, metrics: Arc<Metrics>) {
    info!(
        dir = %dir.display(),
        retention_secs = retention.as_secs(),
        period_secs = period.as_secs(),
        "Retention sweeper started"
    );

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match sweep_artifacts(&dir, retention).await {
            Ok(stats) if stats.removed > 0 => {
                metrics.artifacts_pruned(stats.removed);
                info!(
                    scanned = stats.scanned,
                    removed = stats.removed,
                    bytes_reclaimed = stats.bytes_reclaimed,
                    "Artifact sweep removed expired files"
                );
            }
            Ok(stats) => {
                debug!(scanned = stats.scanned, "Artifact sweep found nothing to remove");
            }
            Err(err) => {
                warn!(error = %err, "Artifact sweep failed");
            }
        }
    }
}
