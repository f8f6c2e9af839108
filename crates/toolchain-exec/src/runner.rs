//! Tool runner trait and the local process implementation

use crate::{
    CancelToken, Error, Result, ToolCommand,
    event::{ToolEvent, ToolEventKind},
    process::{ExitStatus, terminate_pid},
};
use async_process::Stdio;
use async_trait::async_trait;
use futures::StreamExt;
use futures::future::{Either, select};
use futures_lite::io::{AsyncBufReadExt, BufReader};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Sink for streamed tool events (unbounded)
pub type EventSink = async_channel::Sender<ToolEvent>;

/// Captured output of a finished tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// How the process exited
    pub status: ExitStatus,
    /// Accumulated standard output
    pub stdout: String,
    /// Accumulated standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the invocation exited with code zero
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Trait for executing external tools
///
/// Implemented by [`LocalRunner`] for real subprocess execution and by the
/// recording fake in [`crate::testing`] for argv-level assertions.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run a command to completion, streaming events to `events` if given.
    ///
    /// A non-zero exit is reported in the returned [`ToolOutput`], not as an
    /// error; use [`run_checked`](ToolRunner::run_checked) when a non-zero
    /// exit should fail the operation.
    async fn run(
        &self,
        command: ToolCommand,
        cancel: &CancelToken,
        events: Option<&EventSink>,
    ) -> Result<ToolOutput>;

    /// Run a command, turning a non-zero exit into [`Error::NonZeroExit`]
    /// carrying the captured stderr
    async fn run_checked(
        &self,
        command: ToolCommand,
        cancel: &CancelToken,
        events: Option<&EventSink>,
    ) -> Result<ToolOutput> {
        let tool = command.get_program().to_string_lossy().into_owned();
        let output = self.run(command, cancel, events).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::NonZeroExit {
                tool,
                code: output.status.code_or_signal(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Whether the given tool binary is available to this runner
    fn has_tool(&self, program: &str) -> bool;
}

/// Runner that spawns tools as local child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    /// Create a new local runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for LocalRunner {
    async fn run(
        &self,
        command: ToolCommand,
        cancel: &CancelToken,
        events: Option<&EventSink>,
    ) -> Result<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!("Running tool: {}", command);

        let program = command.get_program().to_string_lossy().into_owned();
        let mut async_cmd = command.into_async();
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());

        let mut child = async_cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program.clone())
            } else {
                Error::spawn_failed(e.to_string())
            }
        })?;
        let pid = child.id();

        emit(events, ToolEvent::new(ToolEventKind::Started { pid })).await;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn_failed("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::spawn_failed("child stderr not captured"))?;

        let stdout_lines = BufReader::new(stdout).lines().map(|l| (false, l));
        let stderr_lines = BufReader::new(stderr).lines().map(|l| (true, l));
        let mut merged = futures::stream::select(stdout_lines, stderr_lines);

        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();

        let status = {
            let run_fut = async {
                while let Some((is_stderr, line)) = merged.next().await {
                    let Ok(line) = line else { break };
                    let kind = if is_stderr {
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                        ToolEventKind::Stderr
                    } else {
                        stdout_buf.push_str(&line);
                        stdout_buf.push('\n');
                        ToolEventKind::Stdout
                    };
                    emit(events, ToolEvent::with_data(kind, line)).await;
                }
                child.status().await.map_err(Error::Io)
            };
            futures::pin_mut!(run_fut);

            let cancelled = cancel.cancelled();
            futures::pin_mut!(cancelled);

            match select(run_fut, cancelled).await {
                Either::Left((status, _)) => status?,
                Either::Right(((), run_fut)) => {
                    warn!("Cancelling tool invocation of {} (pid {})", program, pid);
                    if let Err(e) = terminate_pid(pid) {
                        warn!("Failed to terminate pid {}: {}", pid, e);
                    }
                    // Reap the child so it does not linger
                    let _ = run_fut.await;
                    return Err(Error::Cancelled);
                }
            }
        };

        let status = ExitStatus::from(status);
        emit(
            events,
            ToolEvent::new(ToolEventKind::Exited {
                code: status.code,
                signal: status.signal,
            }),
        )
        .await;

        debug!("{} exited with {:?}", program, status.code);

        Ok(ToolOutput {
            status,
            stdout: stdout_buf,
            stderr: stderr_buf,
        })
    }

    fn has_tool(&self, program: &str) -> bool {
        find_on_path(program).is_some()
    }
}

async fn emit(events: Option<&EventSink>, event: ToolEvent) {
    if let Some(sink) = events {
        // The sink is unbounded; an error only means the receiver is gone.
        let _ = sink.send(event).await;
    }
}

/// Locate a program on the PATH
pub(crate) fn find_on_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
