//! Bounded concurrent turns.
//!
//! [`TurnBatch`] runs the same prompt many times, each on a fresh thread
//! and its own `codex exec` process, with at most `max_parallel` processes
//! alive at once. Used for benchmarking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{ThreadOptions, TurnOptions};
use crate::exec::{CancelPoint, RunError, ThreadEvent, ThreadItem, Usage};
use crate::thread::{Codex, TurnResult};

/// Tool activity observed while a turn streamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnMetrics {
    /// Distinct command executions seen.
    pub command_count: usize,
    /// Distinct MCP tool calls seen.
    pub mcp_call_count: usize,
    /// Time between `item.started` and `item.completed` of each command.
    pub command_time: Duration,
    command_started: HashMap<String, Instant>,
    mcp_seen: Vec<String>,
}

impl TurnMetrics {
    /// Record one event received at `at`.
    pub fn observe(&mut self, event: &ThreadEvent, at: Instant) {
        let (started, item) = match event {
            ThreadEvent::ItemStarted(e) => (true, &e.item),
            ThreadEvent::ItemCompleted(e) => (false, &e.item),
            _ => return,
        };

        match item {
            ThreadItem::CommandExecution(cmd) => {
                if started {
                    if self.command_started.insert(cmd.id.clone(), at).is_none() {
                        self.command_count += 1;
                    }
                } else if let Some(start) = self.command_started.remove(&cmd.id) {
                    self.command_time += at.saturating_duration_since(start);
                } else {
                    // Completed without a start event.
                    self.command_count += 1;
                }
            }
            ThreadItem::McpToolCall(call) => {
                if !self.mcp_seen.contains(&call.id) {
                    self.mcp_seen.push(call.id.clone());
                    self.mcp_call_count += 1;
                }
            }
            _ => {}
        }
    }
}

/// Result of one run in a batch.
#[derive(Debug)]
pub struct RunOutcome {
    /// Position of the run, starting at zero.
    pub index: usize,
    /// Wall-clock time from permit acquisition to turn resolution.
    pub elapsed: Duration,
    pub metrics: TurnMetrics,
    pub result: Result<TurnResult, RunError>,
}

/// Aggregated statistics across a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Usage summed over successful runs.
    pub usage: Usage,
    /// Commands summed over all runs.
    pub command_count: usize,
    /// MCP tool calls summed over all runs.
    pub mcp_call_count: usize,
    /// Command time summed over all runs.
    pub command_time: Duration,
    pub min_elapsed: Option<Duration>,
    pub max_elapsed: Option<Duration>,
    total_elapsed: Duration,
}

impl BatchStats {
    /// Add one finished run.
    pub fn add(&mut self, outcome: &RunOutcome) {
        match &outcome.result {
            Ok(turn) => {
                self.succeeded += 1;
                if let Some(usage) = &turn.usage {
                    self.usage.accumulate(usage);
                }
            }
            Err(e) if e.is_cancelled() => self.cancelled += 1,
            Err(_) => self.failed += 1,
        }

        self.command_count += outcome.metrics.command_count;
        self.mcp_call_count += outcome.metrics.mcp_call_count;
        self.command_time += outcome.metrics.command_time;

        self.total_elapsed += outcome.elapsed;
        self.min_elapsed = Some(
            self.min_elapsed
                .map_or(outcome.elapsed, |min| min.min(outcome.elapsed)),
        );
        self.max_elapsed = Some(
            self.max_elapsed
                .map_or(outcome.elapsed, |max| max.max(outcome.elapsed)),
        );
    }

    /// Number of runs recorded.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// Returns true if runs were recorded and none succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.runs() > 0 && self.succeeded == 0
    }

    /// Mean elapsed time, if any run was recorded.
    #[must_use]
    pub fn mean_elapsed(&self) -> Option<Duration> {
        let runs = u32::try_from(self.runs()).ok().filter(|n| *n > 0)?;
        Some(self.total_elapsed / runs)
    }
}

/// Outcomes of a batch, ordered by run index.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RunOutcome>,
    pub stats: BatchStats,
}

/// Runs independent turns with a cap on concurrent processes.
#[derive(Debug)]
pub struct TurnBatch {
    codex: Codex,
    thread_options: ThreadOptions,
    semaphore: Arc<Semaphore>,
    max_parallel: usize,
    cancel: CancellationToken,
}

impl TurnBatch {
    /// Create a batch runner. `max_parallel` is raised to at least one.
    #[must_use]
    pub fn new(codex: Codex, thread_options: ThreadOptions, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            codex,
            thread_options,
            semaphore: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
            cancel: CancellationToken::new(),
        }
    }

    /// Get the concurrency cap.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Get a clone of the token that cancels every run.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all pending and running turns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `prompt` `runs` times and wait for every run to resolve.
    pub async fn run(&self, prompt: &str, runs: usize) -> BatchReport {
        let mut join_set = JoinSet::new();

        for index in 0..runs {
            let codex = self.codex.clone();
            let options = self.thread_options.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = self.cancel.child_token();
            let prompt = prompt.to_string();

            join_set.spawn(async move {
                let permit = tokio::select! {
                    biased;

                    () = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let started = Instant::now();
                let Some(_permit) = permit else {
                    return RunOutcome {
                        index,
                        elapsed: started.elapsed(),
                        metrics: TurnMetrics::default(),
                        result: Err(RunError::Cancelled(CancelPoint::BeforeStart)),
                    };
                };

                tracing::debug!(index, "Starting batch run");
                let mut thread = codex.start_thread(options);
                let mut metrics = TurnMetrics::default();
                let result = thread
                    .run_with(
                        prompt,
                        TurnOptions::new().with_cancellation(cancel),
                        |event| metrics.observe(event, Instant::now()),
                    )
                    .await;

                RunOutcome {
                    index,
                    elapsed: started.elapsed(),
                    metrics,
                    result,
                }
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.stats.add(&outcome);
                    report.outcomes.push(outcome);
                }
                Err(e) => tracing::error!(error = %e, "Batch run task failed"),
            }
        }
        report.outcomes.sort_by_key(|outcome| outcome.index);

        tracing::info!(
            runs,
            succeeded = report.stats.succeeded,
            failed = report.stats.failed,
            cancelled = report.stats.cancelled,
            "Batch finished"
        );
        report
    }
}
