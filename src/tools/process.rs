//! Running a tool with a deadline
//!
//! Arguments are always passed as a discrete list; no shell is involved.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Number of diagnostic lines kept for error reports
pub const TAIL_LINES: usize = 50;

/// Outcome of a tool run that finished before its deadline
#[derive(Debug)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    /// Last `TAIL_LINES` lines of stderr
    pub tail: String,
}

/// Why a tool run produced no output
#[derive(Debug)]
pub enum RunError {
    Spawn(std::io::Error),
    TimedOut,
}

/// Run `program` with `args`, killing it if it outlives `limit`
///
/// With `tool_log` set every stderr line is echoed at info level under the
/// `webmedia::tool` target.
pub async fn run_tool(
    program: &Path,
    args: &[OsString],
    limit: Duration,
    tool_log: bool,
) -> Result<ToolOutput, RunError> {
    let name = program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tool".to_string());
    debug!("Running {} {:?}", name, args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(RunError::Spawn)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = tokio::time::timeout(limit, async {
        let (stdout, tail) = tokio::join!(read_all(stdout), collect_tail(stderr, &name, tool_log));
        let status = child.wait().await;
        (stdout, tail, status)
    })
    .await;

    match finished {
        Ok((stdout, tail, status)) => {
            let status = status.map_err(RunError::Spawn)?;
            Ok(ToolOutput {
                code: status.code(),
                success: status.success(),
                stdout,
                tail,
            })
        }
        Err(_) => {
            debug!("{} exceeded {:?}, killing", name, limit);
            let _ = child.kill().await;
            Err(RunError::TimedOut)
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: Option<R>, name: &str, tool_log: bool) -> String {
    let Some(reader) = reader else {
        return String::new();
    };

    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tool_log {
            info!(target: "webmedia::tool", tool = %name, "{}", line);
        }
        if tail.len() == TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}
