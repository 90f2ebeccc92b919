//! Progress protocol between task executors and the store.
//!
//! Tool-specific output is translated into one event shape at the tool
//! boundary; the store folds events in with `merge`, which keeps percent
//! inside [0, 100] and monotonic within a phase.

use super::types::TaskPhase;

/// Normalized progress report for one task phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: TaskPhase,
    pub percent: f32,
}

impl ProgressEvent {
    pub fn new(phase: TaskPhase, percent: f32) -> Self {
        ProgressEvent { phase, percent }
    }
}

/// Fold an event into the current within-phase percent.
///
/// Returns the new percent, or `None` when the event belongs to a phase the
/// task has already left, would move percent backwards, or is not a finite
/// number. Reports may arrive out of order or held back, so dropping is the
/// per-event answer, never an error.
pub(crate) fn merge(
    current_phase: &TaskPhase,
    current_percent: f32,
    event: &ProgressEvent,
) -> Option<f32> {
    if event.phase != *current_phase || !event.percent.is_finite() {
        return None;
    }
    let percent = event.percent.clamp(0.0, 100.0);
    (percent > current_percent).then_some(percent)
}
