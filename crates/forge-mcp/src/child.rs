//! Scoped ownership of one spawned MCP server process.
//!
//! A [`ChildHandle`] is created at spawn and owned by exactly one call. The
//! call ends with [`ChildHandle::shutdown`] (SIGTERM, grace period, SIGKILL,
//! reap). If the call future is dropped first, `Drop` kills the child.

use crate::error::{FrameError, ProxyError};
use crate::jsonrpc::{self, Reply};
use forge_types::ProcessDescriptor;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Split};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Where a process session is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    AwaitingResponse,
    Completed,
}

/// A failed read or write on the child's pipes.
#[derive(Debug)]
pub(crate) enum PipeError {
    TimedOut,
    Eof,
    Frame(FrameError),
    Io(io::Error),
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out"),
            Self::Eof => f.write_str("server closed stdout"),
            Self::Frame(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

pub(crate) struct ChildHandle {
    command: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Split<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
    state: SessionState,
    next_id: u64,
}

impl ChildHandle {
    /// Spawn the server with `base_env` overridden by the descriptor's env.
    ///
    /// The inherited environment is cleared first: only `base_env` and the
    /// descriptor's variables reach the child.
    pub(crate) fn spawn(
        descriptor: &ProcessDescriptor,
        base_env: &HashMap<String, String>,
    ) -> Result<Self, ProxyError> {
        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args)
            .env_clear()
            .envs(base_env)
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ProxyError::SpawnFailed {
            command: descriptor.command.clone(),
            source: e,
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            // The process is running but unusable; don't leave it behind.
            let _ = child.start_kill();
            return Err(ProxyError::SpawnFailed {
                command: descriptor.command.clone(),
                source: io::Error::other("child stdio pipes were not captured"),
            });
        };

        tracing::debug!(
            command = %descriptor.command,
            pid = ?child.id(),
            "spawned MCP server"
        );

        let stderr_task = tokio::spawn(drain_stderr(descriptor.command.clone(), stderr));

        Ok(Self {
            command: descriptor.command.clone(),
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).split(b'\n'),
            stderr_task: Some(stderr_task),
            state: SessionState::Uninitialized,
            next_id: 1,
        })
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, next: SessionState) {
        tracing::trace!(command = %self.command, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Write one encoded frame to the child's stdin.
    pub(crate) async fn send(&mut self, frame: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed"))?;
        tracing::debug!(command = %self.command, frame = frame.trim_end(), "-> MCP server");
        stdin.write_all(frame.as_bytes()).await?;
        stdin.flush().await
    }

    /// Like [`ChildHandle::send`], but fails with `TimedOut` once `deadline`
    /// passes. A server that stops draining stdin cannot stall the write.
    pub(crate) async fn send_by(&mut self, frame: &str, deadline: Instant) -> Result<(), PipeError> {
        match tokio::time::timeout_at(deadline, self.send(frame)).await {
            Err(_) => Err(PipeError::TimedOut),
            Ok(result) => result.map_err(PipeError::Io),
        }
    }

    /// Read frames until the response to request `id` arrives or `deadline` passes.
    ///
    /// Blank lines and server-initiated messages are skipped. Any other frame
    /// must be the response to `id`.
    pub(crate) async fn read_reply(&mut self, id: u64, deadline: Instant) -> Result<Reply, PipeError> {
        loop {
            let line = match tokio::time::timeout_at(deadline, self.stdout.next_segment()).await {
                Err(_) => return Err(PipeError::TimedOut),
                Ok(Err(e)) => return Err(PipeError::Io(e)),
                Ok(Ok(None)) => return Err(PipeError::Eof),
                Ok(Ok(Some(line))) => line,
            };

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            tracing::debug!(
                command = %self.command,
                frame = %String::from_utf8_lossy(trimmed),
                "<- MCP server"
            );

            let frame = jsonrpc::decode_frame(trimmed).map_err(PipeError::Frame)?;
            if frame.is_server_initiated() {
                tracing::debug!(
                    command = %self.command,
                    method = frame.method.as_deref().unwrap_or_default(),
                    "ignoring server-initiated message"
                );
                continue;
            }
            return frame.into_reply(id).map_err(PipeError::Frame);
        }
    }

    /// Terminate and reap the child. Safe to call more than once.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        // Closing stdin gives well-behaved servers an EOF to exit on.
        drop(self.stdin.take());

        if let Some(mut child) = self.child.take() {
            match terminate(&mut child, grace).await {
                Ok(status) => {
                    tracing::debug!(command = %self.command, state = ?self.state, %status, "MCP server exited");
                }
                Err(e) => {
                    tracing::warn!(command = %self.command, "Failed to terminate MCP server: {e}");
                    let _ = child.start_kill();
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            tracing::debug!(command = %self.command, state = ?self.state, "killing abandoned MCP server");
            let _ = child.start_kill();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Forward child stderr to debug logs so a chatty server never fills the pipe.
async fn drain_stderr(command: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).split(b'\n');
    while let Ok(Some(line)) = lines.next_segment().await {
        tracing::debug!(command = %command, "stderr: {}", String::from_utf8_lossy(&line).trim_end());
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps.
#[cfg(unix)]
async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    let Some(pid) = child.id() else {
        return child.wait().await;
    };
    let pid = i32::try_from(pid).map_err(io::Error::other)?;

    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        // Already gone
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
        return result;
    }

    tracing::debug!(pid, "MCP server ignored SIGTERM, killing");
    child.kill().await?;
    child.wait().await
}

/// No SIGTERM equivalent; kill immediately.
#[cfg(not(unix))]
async fn terminate(child: &mut Child, _grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    child.kill().await?;
    child.wait().await
}
