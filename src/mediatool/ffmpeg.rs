//! Command construction and output parsing for the ffmpeg subprocess.

use tokio::process::Command;

use super::types::{ConvertSpec, MuxSpec};

pub(crate) fn mux_command(bin: &str, spec: &MuxSpec) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-y")
        .arg("-i")
        .arg(&spec.video)
        .arg("-i")
        .arg(&spec.audio)
        .args(["-c:v", "copy", "-c:a", "aac", "-shortest"])
        .args(["-progress", "pipe:1", "-loglevel", "error"])
        .arg(&spec.dest);
    cmd
}

pub(crate) fn convert_command(bin: &str, spec: &ConvertSpec) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-y")
        .arg("-i")
        .arg(&spec.input)
        .args(["-progress", "pipe:1", "-loglevel", "error"])
        .arg(&spec.dest);
    cmd
}

/// Derive percent from one `-progress pipe:1` key=value line.
///
/// Only works with a duration hint; without one there is no denominator
/// and the caller gets no progress, which the status contract allows.
/// `out_time_ms` is microseconds despite the name, same as `out_time_us`.
pub(crate) fn parse_progress(line: &str, duration_secs: Option<f64>) -> Option<f32> {
    let total = duration_secs.filter(|secs| *secs > 0.0)?;
    let value = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))?;
    let micros = value.trim().parse::<f64>().ok()?;
    let percent = micros / 1_000_000.0 / total * 100.0;
    Some(percent.clamp(0.0, 100.0) as f32)
}
