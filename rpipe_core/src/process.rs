//! External tunnel-endpoint process handling.
//!
//! The endpoint executable is opaque to the control plane. This module
//! spawns it with a piped stdin and a single pipe carrying both stdout and
//! stderr, mediates the one-line readiness handshake, and exposes the rest
//! of the output as a lazy line stream that ends when the child closes it.

use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin, Command};
use tokio::time::timeout;
use tracing::debug;

/// Errors from the startup handshake and output streaming.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("child closed its output before emitting a line")]
    EndOfStream,

    #[error("no output from child within {0:?}")]
    Timeout(Duration),
}

/// A spawned tunnel-endpoint process with its combined output stream.
///
/// Owned exclusively by the supervisor that spawned it. Either killed and
/// reaped on a readiness failure, or left to exit on its own and reaped by
/// [`ExternalProcess::wait`].
pub struct ExternalProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<pipe::Receiver>>,
}

impl ExternalProcess {
    /// Spawn the executable with no arguments. Stdin is a pipe held by the
    /// parent; stdout and stderr share one pipe so the child's diagnostics
    /// interleave in emission order.
    pub fn spawn(executable: &Path) -> std::io::Result<Self> {
        let (output_rx, output_tx) = {
            let (tx, rx) = pipe::pipe()?;
            (rx, tx.into_blocking_fd()?)
        };
        let stderr_fd: OwnedFd = output_tx.try_clone()?;

        let mut child = Command::new(executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(output_tx))
            .stderr(Stdio::from(stderr_fd))
            .spawn()?;

        debug!(pid = child.id(), executable = %executable.display(), "spawned endpoint process");

        let stdin = child.stdin.take();
        Ok(ExternalProcess {
            child,
            stdin,
            lines: BufReader::new(output_rx).lines(),
        })
    }

    /// OS process id, if the child has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write end of the child's stdin.
    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Read the child's first output line, waiting at most `wait` when a
    /// bound is given. Fails if the stream closes before a line arrives or
    /// the bound expires; the caller decides whether the line is the banner
    /// it expects.
    pub async fn await_ready(&mut self, wait: Option<Duration>) -> Result<String, ProcessError> {
        let line = match wait {
            Some(bound) => timeout(bound, self.lines.next_line())
                .await
                .map_err(|_| ProcessError::Timeout(bound))??,
            None => self.lines.next_line().await?,
        };
        line.ok_or(ProcessError::EndOfStream)
    }

    /// Next line of combined output, or `None` once the child has closed
    /// the stream (normally because it exited).
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    /// Best-effort kill followed by a wait for the exit status. A kill that
    /// fails because the process already exited is swallowed; the wait still
    /// reaps the child.
    pub async fn kill_and_wait(&mut self) -> std::io::Result<ExitStatus> {
        let _ = self.child.start_kill();
        self.child.wait().await
    }

    /// Wait for the child to exit on its own and reap it.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Map an exit status to the code the launcher propagates as its own:
/// the child's code, or `128 + signal` when the child was signalled.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
