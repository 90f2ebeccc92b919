//! Subprocess plumbing shared by the yt-dlp and ffmpeg adapters.

use std::collections::VecDeque;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::traits::{Result, ToolError};

/// Lines of stderr retained for failure diagnostics.
const STDERR_TAIL_LINES: usize = 12;

/// Spawn `cmd` with piped stdio, detached into its own process group.
///
/// Group membership is what makes cancellation reliable: the tools fork
/// helper processes, and killing only the direct child would leave those
/// running and holding the scratch files.
pub(crate) fn spawn(tool: &str, cmd: &mut Command) -> Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })
}

/// Kill the child's whole process group and reap it.
pub(crate) async fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child is its own group leader, so its pid doubles as the pgid.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if let Err(error) = child.wait().await {
        warn!(error = %error, "Failed to reap killed child");
    }
}

/// Drive a spawned tool to completion, feeding stdout lines to `on_line`.
///
/// Stderr is buffered into a short tail that becomes the failure detail on
/// a nonzero exit. When the cancellation token fires, the process group is
/// killed and reaped before `Cancelled` is returned.
pub(crate) async fn run_streaming<F>(
    tool: &str,
    mut child: Child,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::Output("stdout pipe missing".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolError::Output("stderr pipe missing".to_string()))?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => match line? {
                Some(line) => on_line(&line),
                None => out_done = true,
            },
            line = err_lines.next_line(), if !err_done => match line? {
                Some(line) => {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                None => err_done = true,
            },
            _ = cancel.cancelled() => {
                debug!(tool, "Cancellation requested, killing process group");
                kill_group(&mut child).await;
                return Err(ToolError::Cancelled);
            }
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        let detail = if tail.is_empty() {
            format!("exit status {}", status)
        } else {
            format!(
                "exit status {}: {}",
                status,
                tail.into_iter().collect::<Vec<_>>().join("; ")
            )
        };
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            detail,
        });
    }

    Ok(())
}

/// Trailing stderr lines of a finished process, for error messages.
pub(crate) fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(3);
    let excerpt = lines[start..].join("; ");
    if excerpt.is_empty() {
        "no diagnostic output".to_string()
    } else {
        excerpt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_excerpt_keeps_last_lines() {
        let raw = b"line one\nline two\nline three\nline four\n";
        assert_eq!(stderr_excerpt(raw), "line two; line three; line four");
    }

    #[test]
    fn test_stderr_excerpt_handles_empty_output() {
        assert_eq!(stderr_excerpt(b""), "no diagnostic output");
        assert_eq!(stderr_excerpt(b"\n  \n"), "no diagnostic output");
    }
}
