//! Claude Code CLI back-end
//!
//! Runs the agent non-interactively and reads its `stream-json` output:
//!
//! ```text
//! claude --print --output-format stream-json --verbose --permission-mode <mode>
//! ```
//!
//! The prompt is written to the child's stdin. Each stdout line is one
//! `StreamEvent`. Dropping the returned `EventStream` kills the child.

use super::{tail, truncate};
use crate::error::QueryError;
use crate::event::StreamEvent;
use crate::query::{AgentQuery, DEFAULT_STREAM_CAPACITY, EventSender, EventStream, QueryRequest};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Characters of stderr kept for error reports
const STDERR_TAIL: usize = 2000;

#[derive(Debug, Clone)]
pub struct ClaudeCli {
    program: String,
    extra_args: Vec<String>,
    capacity: usize,
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    /// Extra arguments appended after the fixed flags (e.g. `--model`).
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Build the child command for one query.
    pub fn command(&self, request: &QueryRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--print",
            "--output-format",
            "stream-json",
            "--verbose",
            "--permission-mode",
            request.options.permission_mode.as_str(),
        ])
        .args(&self.extra_args)
        .current_dir(&request.options.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

impl AgentQuery for ClaudeCli {
    fn start(&self, request: QueryRequest) -> Result<EventStream, QueryError> {
        let mut child = self
            .command(&request)
            .spawn()
            .map_err(|source| QueryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| QueryError::Closed("agent stdout not captured".into()))?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take();

        info!(
            program = %self.program,
            pid = child.id().unwrap_or_default(),
            cwd = %request.options.cwd.display(),
            "agent process started"
        );

        let (tx, stream) = EventStream::channel(self.capacity);
        tokio::spawn(pump(child, stdin, stdout, stderr, request.prompt, tx));
        Ok(stream)
    }
}

/// Feed the prompt, then forward stdout events until EOF or until the
/// consumer goes away.
async fn pump(
    mut child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    prompt: String,
    tx: EventSender,
) {
    let stderr_task = stderr.map(|stderr| tokio::spawn(collect_stderr(stderr)));

    if let Some(mut stdin) = stdin {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            warn!("failed to write prompt to agent: {e}");
        }
        // EOF on stdin starts the run.
        drop(stdin);
    }

    let mut lines = BufReader::new(stdout).lines();
    let mut saw_result = false;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("event stream dropped, stopping agent");
                let _ = child.kill().await;
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let item = StreamEvent::parse(line).map_err(|e| QueryError::Parse {
                        line: truncate(line, 200).to_string(),
                        message: e.to_string(),
                    });
                    let failed = item.is_err();
                    saw_result |= matches!(item, Ok(StreamEvent::Result(_)));
                    if !tx.send(item).await || failed {
                        let _ = child.kill().await;
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    let _ = child.kill().await;
                    return;
                }
            }
        }
    }

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = tx.closed() => None,
    };
    let Some(status) = status else {
        let _ = child.kill().await;
        return;
    };

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    match status {
        Ok(status) if status.success() || saw_result => {
            debug!(%status, "agent process exited");
        }
        Ok(status) => {
            warn!(%status, "agent exited without a result");
            let _ = tx
                .send(Err(QueryError::Exited {
                    status: status.to_string(),
                    stderr,
                }))
                .await;
        }
        Err(e) => {
            let _ = tx.send(Err(e.into())).await;
        }
    }
}

async fn collect_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut buf = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stderr = %line, "agent stderr");
        buf.push_str(&line);
        buf.push('\n');
        if buf.len() > STDERR_TAIL * 4 {
            buf = tail(&buf, STDERR_TAIL).to_string();
        }
    }
    tail(buf.trim_end(), STDERR_TAIL).to_string()
}
