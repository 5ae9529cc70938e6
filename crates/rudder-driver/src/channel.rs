//! Child process channel speaking newline-delimited text over piped stdio.
//!
//! [`ProcessChannel::open`] spawns one driver executable with piped
//! stdin/stdout/stderr and splits it into:
//!
//! - [`LineStream`]: an ordered, pull-based sequence of stdout lines.
//!   Nothing is read until the consumer asks for the next line, so the
//!   consumer controls backpressure.
//! - [`DiagnosticStream`]: raw stderr chunks, not line-framed.
//! - [`ChannelWriter`]: a clonable write handle that serializes physical
//!   writes and silently drops them once the process is gone.
//! - the [`Child`] handle itself, for waiting and force-killing.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::DriverError;

/// Why the child process is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Normal exit with a code.
    Code(i32),
    /// Terminated by a signal (Unix).
    Signal(i32),
    /// The status could not be determined.
    Unknown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Code(code) => write!(f, "exit code {code}"),
            ExitReason::Signal(sig) => write!(f, "signal {sig}"),
            ExitReason::Unknown => write!(f, "unknown exit status"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitReason {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitReason::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitReason::Signal(sig);
            }
        }
        ExitReason::Unknown
    }
}

/// Clonable write half of a channel.
///
/// Physical writes are serialized behind an async mutex because commands
/// may be issued concurrently with the reader loop. Once the process has
/// exited (broken pipe) or the channel is closed, writes are dropped
/// silently.
#[derive(Clone)]
pub struct ChannelWriter {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
}

impl ChannelWriter {
    /// Append a newline and forward the line to the process input.
    pub async fn write_line(&self, line: &str) {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            debug!("write after channel close dropped");
            return;
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let result = async {
            stdin.write_all(&buf).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            // The process is gone; drop the write and stop trying.
            debug!(error = %e, "write to exited driver process dropped");
            guard.take();
        }
    }

    /// Close the write half. The process sees EOF on its input. Idempotent.
    pub async fn close(&self) {
        self.stdin.lock().await.take();
    }
}

/// Ordered, pull-based sequence of stdout lines.
///
/// Lines are delivered exactly in the order the process wrote them; the
/// next line is not read until [`next_line`](Self::next_line) is called
/// again. Trailing carriage returns are stripped.
pub struct LineStream {
    lines: Lines<BufReader<ChildStdout>>,
}

impl LineStream {
    /// Pull the next output line. Returns `None` once the stream has
    /// ended (process exit or read error).
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(Some(mut line)) => {
                if line.ends_with('\r') {
                    line.pop();
                }
                Some(line)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "driver stdout read failed, treating as end of stream");
                None
            }
        }
    }
}

/// Raw stderr chunks, forwarded verbatim and not line-framed.
pub struct DiagnosticStream {
    stderr: ChildStderr,
}

impl DiagnosticStream {
    /// Pull the next chunk of diagnostic text. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> Option<String> {
        let mut buf = [0u8; 4096];
        match self.stderr.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
            Err(e) => {
                debug!(error = %e, "driver stderr read failed");
                None
            }
        }
    }
}

/// One spawned driver process with its three stdio streams.
pub struct ProcessChannel {
    child: Child,
    writer: ChannelWriter,
    lines: LineStream,
    diagnostics: DiagnosticStream,
}

impl std::fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessChannel").finish_non_exhaustive()
    }
}

impl ProcessChannel {
    /// Spawn the executable with piped stdio.
    ///
    /// The child is configured with `kill_on_drop` so an abandoned channel
    /// cannot leak a process.
    pub fn open(program: &Path, env: &[(String, String)]) -> Result<Self, DriverError> {
        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| DriverError::Spawn {
            command: program.to_path_buf(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| DriverError::Spawn {
            command: program.to_path_buf(),
            reason: "child stdin not captured".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DriverError::Spawn {
            command: program.to_path_buf(),
            reason: "child stdout not captured".into(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| DriverError::Spawn {
            command: program.to_path_buf(),
            reason: "child stderr not captured".into(),
        })?;

        debug!(
            pid = child.id(),
            program = %program.display(),
            "spawned driver process"
        );

        Ok(Self {
            child,
            writer: ChannelWriter {
                stdin: Arc::new(Mutex::new(Some(stdin))),
            },
            lines: LineStream {
                lines: BufReader::new(stdout).lines(),
            },
            diagnostics: DiagnosticStream { stderr },
        })
    }

    /// A clone of the write half.
    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    /// Split the channel into its parts for independent ownership.
    pub fn split(self) -> (Child, ChannelWriter, LineStream, DiagnosticStream) {
        (self.child, self.writer, self.lines, self.diagnostics)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn lines_arrive_in_order_until_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "seq.sh", "echo one\necho two\necho three\n");
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let (_child, _writer, mut lines, _diag) = channel.split();

        assert_eq!(lines.next_line().await.as_deref(), Some("one"));
        assert_eq!(lines.next_line().await.as_deref(), Some("two"));
        assert_eq!(lines.next_line().await.as_deref(), Some("three"));
        assert!(lines.next_line().await.is_none());
    }

    #[tokio::test]
    async fn crlf_output_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "crlf.sh", "printf 'alpha\\r\\nbeta\\r\\n'\n");
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let (_child, _writer, mut lines, _diag) = channel.split();

        assert_eq!(lines.next_line().await.as_deref(), Some("alpha"));
        assert_eq!(lines.next_line().await.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn write_roundtrips_through_cat() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "cat.sh", "exec cat\n");
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let (_child, writer, mut lines, _diag) = channel.split();

        writer.write_line("ping").await;
        assert_eq!(lines.next_line().await.as_deref(), Some("ping"));
        writer.close().await;
        assert!(lines.next_line().await.is_none());
    }

    #[tokio::test]
    async fn write_after_exit_is_silently_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "quick.sh", "exit 0\n");
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let (mut child, writer, _lines, _diag) = channel.split();

        child.wait().await.unwrap();
        // Two writes: the first may surface the broken pipe, the second
        // must hit the already-closed path. Neither may panic or error.
        writer.write_line("late").await;
        writer.write_line("later").await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "cat2.sh", "exec cat\n");
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let writer = channel.writer();
        writer.close().await;
        writer.close().await;
        writer.write_line("dropped").await;
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            "noisy.sh",
            "echo stdout-line\necho 'diagnostic text' >&2\n",
        );
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let (_child, _writer, mut lines, mut diag) = channel.split();

        assert_eq!(lines.next_line().await.as_deref(), Some("stdout-line"));
        let chunk = diag.next_chunk().await.unwrap();
        assert!(chunk.contains("diagnostic text"));
    }

    #[tokio::test]
    async fn env_reaches_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "env.sh", "echo \"$DRIVER_MARKER\"\n");
        let env = vec![("DRIVER_MARKER".to_string(), "present".to_string())];
        let channel = ProcessChannel::open(&path, &env).unwrap();
        let (_child, _writer, mut lines, _diag) = channel.split();
        assert_eq!(lines.next_line().await.as_deref(), Some("present"));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let err = ProcessChannel::open(Path::new("/nonexistent/driver-bin"), &[]).unwrap_err();
        match err {
            DriverError::Spawn { command, .. } => {
                assert_eq!(command, PathBuf::from("/nonexistent/driver-bin"));
            }
            other => panic!("expected Spawn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exit_reason_from_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "fail.sh", "exit 3\n");
        let channel = ProcessChannel::open(&path, &[]).unwrap();
        let (mut child, _writer, _lines, _diag) = channel.split();
        let status = child.wait().await.unwrap();
        assert_eq!(ExitReason::from(status), ExitReason::Code(3));
    }
}
