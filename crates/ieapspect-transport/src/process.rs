//! Helper-process transport.
//!
//! Some digitizers are driven through a vendor library that only exists as
//! a native helper program. The helper speaks the device protocol on its
//! stdin/stdout; this transport spawns it and treats the two pipes as one
//! byte stream. The helper is killed when the transport is dropped.

use async_trait::async_trait;
use ieapspect_core::error::{Error, Result};
use ieapspect_core::transport::Transport;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// How long `close()` waits for the helper to exit after stdin is closed.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Byte stream to a spawned helper process.
pub struct ProcessTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    program: String,
}

impl ProcessTransport {
    /// Spawn `program` with `args`, capturing its stdin and stdout.
    ///
    /// The helper's stderr is inherited so its diagnostics reach the
    /// operator's console.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        tracing::debug!(program = %program, "Spawning helper process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(program = %program, error = %e, "Failed to spawn helper");
                Error::Transport(format!("Failed to spawn {}: {}", program, e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        if stdin.is_none() || stdout.is_none() {
            return Err(Error::Transport(format!(
                "{} was spawned without piped stdio",
                program
            )));
        }

        tracing::info!(program = %program, pid = child.id(), "Helper process started");

        Ok(Self {
            child,
            stdin,
            stdout,
            program: program.to_string(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Process id, while the helper is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn lost(&mut self) -> Error {
        self.stdin = None;
        self.stdout = None;
        Error::ConnectionLost
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(program = %self.program, bytes = data.len(), data = ?data, "Sending data");

        let written = match stdin.write_all(data).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::error!(program = %self.program, "Helper closed its stdin");
                Err(self.lost())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stdout = self.stdout.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stdout.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::error!(program = %self.program, "Helper process closed its stdout");
                Err(self.lost())
            }
            Ok(Ok(n)) => {
                tracing::trace!(program = %self.program, bytes = n, "Received data");
                Ok(n)
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Closing stdin is the helper's cue to shut the device down.
        self.stdin = None;
        self.stdout = None;

        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(program = %self.program, %status, "Helper process exited");
            }
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => {
                tracing::warn!(program = %self.program, "Helper did not exit, killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stdin.is_some() && self.stdout.is_some()
    }
}
