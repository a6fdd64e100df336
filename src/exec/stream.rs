//! Stream parser for `codex exec` stdout.
//!
//! [`parse_event`] decodes one line, [`EventReader`] pulls events from any
//! buffered reader, and [`ExecStream`] drives a spawned child: it sends the
//! prompt, yields events in arrival order, checks the cancellation token
//! at every suspension point, and reports the exit status once stdout
//! closes.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::exec::{CancelPoint, CodexExec, DecodeError, ExecArgs, ExecProcess, RunError, ThreadEvent};

/// Parse a single line of `--experimental-json` output.
///
/// Blank lines yield `Ok(None)` and should be skipped.
///
/// # Errors
///
/// Returns `DecodeError` if the line is not a JSON object with a known
/// event `type`, or if a nested item has an unknown `type`.
pub fn parse_event(line: &str) -> Result<Option<ThreadEvent>, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| DecodeError::new(line, &e))
}

/// Reads newline-delimited events from a buffered reader.
#[derive(Debug)]
pub struct EventReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> EventReader<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Read the next event, skipping blank lines.
    ///
    /// Returns `Ok(None)` at end of input. A partial line left by a
    /// cancelled call is kept and completed by the next one.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Decode` for a malformed or non-UTF-8 line and
    /// `RunError::Io` if the underlying read fails.
    pub async fn next_event(&mut self) -> Result<Option<ThreadEvent>, RunError> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 && self.buf.is_empty() {
                return Ok(None);
            }

            let bytes = std::mem::take(&mut self.buf);
            let end = bytes
                .iter()
                .rposition(|b| !matches!(b, b'\n' | b'\r'))
                .map_or(0, |i| i + 1);
            let line = std::str::from_utf8(&bytes[..end])
                .map_err(|e| DecodeError::invalid_utf8(&bytes[..end], &e))?;

            if let Some(event) = parse_event(line)? {
                tracing::trace!(kind = event.kind(), "Decoded event");
                return Ok(Some(event));
            }
        }
    }
}

/// Outcome of one wait on stdout.
enum Next {
    Cancelled,
    Read(Result<Option<ThreadEvent>, RunError>),
}

/// Event sequence of one running `codex exec` turn.
///
/// Single pass: once `next_event` returns `None` or an error, the child
/// has been reaped or terminated and the stream stays exhausted. Dropping
/// the stream early kills the child.
#[derive(Debug)]
pub struct ExecStream {
    process: ExecProcess,
    reader: EventReader<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    cancel: Option<CancellationToken>,
    terminate_timeout: Duration,
    events_seen: usize,
    done: bool,
}

impl ExecStream {
    /// Spawn `codex exec`, send `input` on stdin, and return the stream.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Spawn` if the child cannot start,
    /// `RunError::Cancelled` if the token fires before the prompt is
    /// delivered, or `RunError::Io` if writing the prompt fails. The child
    /// is terminated before any of these are returned.
    pub async fn start(
        exec: &CodexExec,
        args: &ExecArgs,
        input: &str,
        cancel: Option<CancellationToken>,
        terminate_timeout: Duration,
    ) -> Result<Self, RunError> {
        let mut process = exec.spawn(args)?;
        let stdout = process.take_stdout().ok_or(RunError::NoStdio("stdout"))?;
        let stderr = process.take_stderr().map(|pipe| tokio::spawn(collect_stderr(pipe)));

        let mut stream = Self {
            process,
            reader: EventReader::new(BufReader::new(stdout)),
            stderr,
            cancel,
            terminate_timeout,
            events_seen: 0,
            done: false,
        };

        if stream.is_cancelled() {
            return Err(stream.abort(RunError::Cancelled(CancelPoint::BeforeStart)).await);
        }

        if let Err(e) = stream.process.write_input(input).await {
            return Err(stream.abort(e.into()).await);
        }

        if stream.is_cancelled() {
            return Err(stream
                .abort(RunError::Cancelled(CancelPoint::BeforeFirstEvent))
                .await);
        }

        Ok(stream)
    }

    /// Check if the turn's token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Number of events yielded so far.
    #[must_use]
    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the child has exited successfully. A non-zero
    /// exit, a malformed line, or a cancellation is yielded as an error,
    /// after which the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<Result<ThreadEvent, RunError>> {
        if self.done {
            return None;
        }

        let next = match self.cancel.clone() {
            Some(cancel) => tokio::select! {
                biased;

                () = cancel.cancelled() => Next::Cancelled,
                read = self.reader.next_event() => Next::Read(read),
            },
            None => Next::Read(self.reader.next_event().await),
        };

        match next {
            Next::Cancelled => {
                let point = self.cancel_point();
                tracing::info!(%point, "Turn cancelled via token");
                Some(Err(self.abort(RunError::Cancelled(point)).await))
            }
            Next::Read(Ok(Some(event))) => {
                if self.is_cancelled() {
                    let point = self.cancel_point();
                    return Some(Err(self.abort(RunError::Cancelled(point)).await));
                }
                self.events_seen += 1;
                Some(Ok(event))
            }
            Next::Read(Ok(None)) => self.finish().await.err().map(Err),
            Next::Read(Err(e)) => {
                tracing::warn!(error = %e, "Event stream failed, terminating codex exec");
                Some(Err(self.abort(e).await))
            }
        }
    }

    /// Stop the child without waiting for it to finish the turn.
    pub async fn close(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.terminate().await;
    }

    /// Convert into a `futures` stream.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = Result<ThreadEvent, RunError>> {
        futures_util::stream::unfold(self, |mut stream| async move {
            let item = stream.next_event().await?;
            Some((item, stream))
        })
    }

    fn cancel_point(&self) -> CancelPoint {
        if self.events_seen == 0 {
            CancelPoint::BeforeFirstEvent
        } else {
            CancelPoint::Streaming
        }
    }

    /// Reap the child after stdout closed and classify its exit.
    async fn finish(&mut self) -> Result<(), RunError> {
        self.done = true;

        let status = match self.process.wait().await {
            Ok(status) => status,
            Err(e) => return Err(self.abort(e.into()).await),
        };
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if self.is_cancelled() {
            return Err(RunError::Cancelled(CancelPoint::AfterExit));
        }

        if !status.success() {
            tracing::debug!(code = ?status.code(), "codex exec exited unsuccessfully");
            return Err(RunError::ProcessFailed {
                code: status.code(),
                stderr,
            });
        }

        tracing::debug!(events = self.events_seen, "codex exec finished");
        Ok(())
    }

    async fn abort(&mut self, err: RunError) -> RunError {
        self.done = true;
        self.terminate().await;
        err
    }

    async fn terminate(&mut self) {
        if let Err(e) = self.process.graceful_terminate(self.terminate_timeout).await {
            tracing::warn!(error = %e, "Failed to terminate codex exec");
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

async fn collect_stderr(mut pipe: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "Failed to read codex exec stderr");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
