//! Client and thread handles for running turns.
//!
//! A [`Codex`] client creates [`Thread`]s. Each call to [`Thread::run`] or
//! [`Thread::run_streamed`] spawns one `codex exec` process for one turn;
//! the thread id learned from `thread.started` is passed back as
//! `resume <id>` on the next turn.

use std::time::Duration;

use crate::config::{CodexOptions, ThreadOptions, TurnOptions};
use crate::exec::{CodexExec, ExecArgs, ExecStream, RunError, ThreadEvent};
use crate::input::Input;
use crate::schema::{create_output_schema_file, OutputSchemaFile};
use crate::thread::{TurnAggregator, TurnResult};

/// Entry point for running `codex exec` turns.
#[derive(Debug, Clone)]
pub struct Codex {
    exec: CodexExec,
    terminate_timeout: Duration,
}

impl Codex {
    /// Create a client from options.
    #[must_use]
    pub fn new(options: &CodexOptions) -> Self {
        Self {
            exec: CodexExec::new(options),
            terminate_timeout: options.terminate_timeout(),
        }
    }

    /// Start a new thread. Its id is assigned by the first turn.
    #[must_use]
    pub fn start_thread(&self, options: ThreadOptions) -> Thread {
        Thread {
            exec: self.exec.clone(),
            terminate_timeout: self.terminate_timeout,
            options,
            id: None,
        }
    }

    /// Continue an existing thread by id.
    #[must_use]
    pub fn resume_thread(&self, thread_id: impl Into<String>, options: ThreadOptions) -> Thread {
        Thread {
            exec: self.exec.clone(),
            terminate_timeout: self.terminate_timeout,
            options,
            id: Some(thread_id.into()),
        }
    }
}

/// A resumable conversation.
#[derive(Debug, Clone)]
pub struct Thread {
    exec: CodexExec,
    terminate_timeout: Duration,
    options: ThreadOptions,
    id: Option<String>,
}

impl Thread {
    /// Thread id, known once a turn has reported `thread.started`.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Options applied to every turn of this thread.
    #[must_use]
    pub fn options(&self) -> &ThreadOptions {
        &self.options
    }

    /// Start a turn and return its events as they arrive.
    ///
    /// # Errors
    ///
    /// Returns `RunError` if the output schema cannot be written, the
    /// process cannot be spawned, or the turn is cancelled before the
    /// prompt is delivered.
    pub async fn run_streamed(
        &mut self,
        input: impl Into<Input>,
        turn: TurnOptions,
    ) -> Result<StreamedTurn<'_>, RunError> {
        let (prompt, images) = input.into().normalize();
        let schema = create_output_schema_file(turn.output_schema.as_ref())?;

        let mut args = ExecArgs::from_thread_options(&self.options).images(images);
        if let Some(file) = &schema {
            args = args.output_schema_file(file.path());
        }
        if let Some(id) = &self.id {
            args = args.resume(id.clone());
        }

        tracing::info!(thread_id = ?self.id, "Starting turn");
        let stream = ExecStream::start(
            &self.exec,
            &args,
            &prompt,
            turn.cancel,
            self.terminate_timeout,
        )
        .await?;

        Ok(StreamedTurn {
            thread_id: &mut self.id,
            stream,
            _schema: schema,
        })
    }

    /// Run a turn to completion.
    ///
    /// # Errors
    ///
    /// Returns `RunError::TurnFailed` if the agent reported a failure,
    /// `RunError::ProcessFailed` if `codex exec` exited unsuccessfully,
    /// `RunError::Cancelled` if the turn's token fired, and
    /// `RunError::Decode` for a malformed event line.
    pub async fn run(
        &mut self,
        input: impl Into<Input>,
        turn: TurnOptions,
    ) -> Result<TurnResult, RunError> {
        self.run_with(input, turn, |_| {}).await
    }

    /// Run a turn to completion, passing every event to `on_event` as it
    /// arrives.
    ///
    /// # Errors
    ///
    /// Same as [`Thread::run`].
    pub async fn run_with<F>(
        &mut self,
        input: impl Into<Input>,
        turn: TurnOptions,
        mut on_event: F,
    ) -> Result<TurnResult, RunError>
    where
        F: FnMut(&ThreadEvent),
    {
        let mut streamed = self.run_streamed(input, turn).await?;
        let mut aggregator = TurnAggregator::new();

        while let Some(event) = streamed.next_event().await {
            let event = event?;
            on_event(&event);
            if aggregator.apply(&event).is_break() {
                streamed.close().await;
                break;
            }
        }
        drop(streamed);

        let result = aggregator.finish();
        match &result {
            Ok(turn) => tracing::info!(
                thread_id = ?self.id,
                items = turn.items.len(),
                usage = ?turn.usage,
                "Turn completed"
            ),
            Err(e) => tracing::info!(thread_id = ?self.id, error = %e, "Turn failed"),
        }
        result
    }
}

/// Events of a turn in progress.
///
/// Holds the thread mutably so `thread.started` can update its id, and
/// keeps the output schema file alive until the turn ends.
#[derive(Debug)]
pub struct StreamedTurn<'a> {
    thread_id: &'a mut Option<String>,
    stream: ExecStream,
    _schema: Option<OutputSchemaFile>,
}

impl<'a> StreamedTurn<'a> {
    /// Wait for the next event. `None` after the process exited cleanly.
    pub async fn next_event(&mut self) -> Option<Result<ThreadEvent, RunError>> {
        let event = self.stream.next_event().await?;
        if let Ok(ThreadEvent::ThreadStarted(started)) = &event {
            tracing::debug!(thread_id = %started.thread_id, "Thread started");
            *self.thread_id = Some(started.thread_id.clone());
        }
        Some(event)
    }

    /// Stop the turn, terminating `codex exec`.
    pub async fn close(&mut self) {
        self.stream.close().await;
    }

    /// Convert into a `futures` stream.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = Result<ThreadEvent, RunError>> + 'a {
        futures_util::stream::unfold(self, |mut turn| async move {
            let item = turn.next_event().await?;
            Some((item, turn))
        })
    }
}
