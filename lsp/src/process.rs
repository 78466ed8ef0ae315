//! Server process handle — owns the child and its stdio tasks.
//!
//! Stdout chunks and stderr lines are handed to a [`ProcessSink`]; outbound
//! messages are queued on an unbounded channel and written by a dedicated
//! task so that callers never block on the pipe.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::FrameWriter;
use crate::protocol::Outbound;
use crate::types::{ServerStopReason, StartError};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Receives everything the server process produces.
pub(crate) trait ProcessSink: Send + Sync + 'static {
    /// A chunk of raw stdout bytes, in arrival order.
    fn stdout(&self, chunk: &[u8]);
    /// One stderr line without its line terminator.
    fn stderr_line(&self, line: String);
    /// Stdout reached EOF or a pipe failed. Called at most once per stream
    /// task that ends on its own.
    fn closed(&self, reason: ServerStopReason);
}

pub(crate) struct ServerProcess {
    child: Child,
    writer_tx: mpsc::UnboundedSender<Outbound>,
    reader_handle: JoinHandle<()>,
    stderr_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl ServerProcess {
    /// Spawn `command` with piped stdio and start the I/O tasks.
    pub fn spawn(
        command: &str,
        args: &[String],
        sink: Arc<dyn ProcessSink>,
    ) -> Result<Self, StartError> {
        let resolved_cmd = which::which(command).map_err(|source| StartError::NotFound {
            command: command.to_string(),
            source,
        })?;

        let mut child = Command::new(&resolved_cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartError::Spawn {
                command: command.to_string(),
                source,
            })?;

        tracing::info!(pid = ?child.id(), "Started language server {command}");

        let stdin = child.stdin.take().ok_or(StartError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(StartError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(StartError::MissingPipe("stderr"))?;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let writer_handle = tokio::spawn(write_loop(stdin, writer_rx, Arc::clone(&sink)));
        let reader_handle = tokio::spawn(read_loop(stdout, Arc::clone(&sink)));
        let stderr_handle = tokio::spawn(stderr_loop(stderr, sink));

        Ok(Self {
            child,
            writer_tx,
            reader_handle,
            stderr_handle,
            writer_handle,
        })
    }

    /// Queue a message for the writer task. Returns `false` once the writer
    /// has gone away.
    pub fn send(&self, msg: Outbound) -> bool {
        self.writer_tx.send(msg).is_ok()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the process and release its resources.
    ///
    /// Messages already queued are still flushed. With `graceful` set, the
    /// process first gets that long to exit on its own; it is then killed
    /// regardless and given `kill_grace` to be reaped.
    pub async fn terminate(self, graceful: Option<Duration>, kill_grace: Duration) {
        let Self {
            mut child,
            writer_tx,
            reader_handle,
            stderr_handle,
            writer_handle,
        } = self;

        // Closing the channel lets the writer drain what is queued and exit.
        drop(writer_tx);

        if let Some(wait) = graceful {
            match tokio::time::timeout(wait, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("Language server exited: {status}"),
                Ok(Err(e)) => tracing::debug!("Waiting for language server failed: {e}"),
                Err(_) => tracing::debug!("Language server didn't exit in time, killing"),
            }
        }

        if let Err(e) = child.start_kill() {
            tracing::trace!("Kill skipped: {e}");
        }
        if tokio::time::timeout(kill_grace, child.wait()).await.is_err() {
            tracing::warn!("Language server still running after kill");
        }

        reader_handle.abort();
        stderr_handle.abort();
        writer_handle.abort();
    }
}

async fn write_loop<W>(
    stdin: W,
    mut writer_rx: mpsc::UnboundedReceiver<Outbound>,
    sink: Arc<dyn ProcessSink>,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = FrameWriter::new(stdin);
    while let Some(msg) = writer_rx.recv().await {
        if let Err(e) = writer.write_frame(&msg).await {
            tracing::warn!("LSP write error: {e:#}");
            sink.closed(ServerStopReason::Failed(format!("{e:#}")));
            break;
        }
    }
}

async fn read_loop<R>(mut stdout: R, sink: Arc<dyn ProcessSink>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("Language server closed stdout");
                sink.closed(ServerStopReason::Exited);
                break;
            }
            Ok(n) => sink.stdout(&buf[..n]),
            Err(e) => {
                tracing::warn!("LSP read error: {e}");
                sink.closed(ServerStopReason::Failed(e.to_string()));
                break;
            }
        }
    }
}

async fn stderr_loop<R>(stderr: R, sink: Arc<dyn ProcessSink>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = line.trim_end_matches(['\r', '\n']);
                if !text.is_empty() {
                    sink.stderr_line(text.to_string());
                }
            }
            Err(e) => {
                tracing::debug!("Failed to read language server stderr: {e}");
                break;
            }
        }
    }
}
