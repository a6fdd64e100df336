//! Turn error types.

use std::fmt;

use crate::exec::SpawnError;
use crate::schema::SchemaError;

/// A stdout line that could not be decoded into a `ThreadEvent`.
#[derive(thiserror::Error, Debug)]
#[error("Failed to decode event line {input:?}: {reason}")]
pub struct DecodeError {
    /// The offending line.
    pub input: String,
    /// Parser message.
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn new(input: &str, err: &serde_json::Error) -> Self {
        Self {
            input: input.to_string(),
            reason: err.to_string(),
        }
    }

    /// A line that is not valid UTF-8. `input` holds a lossy copy.
    pub(crate) fn invalid_utf8(bytes: &[u8], err: &std::str::Utf8Error) -> Self {
        Self {
            input: String::from_utf8_lossy(bytes).into_owned(),
            reason: err.to_string(),
        }
    }
}

/// Check point at which a cancellation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    /// Before the prompt was written to the child.
    BeforeStart,
    /// After the prompt was sent, before any event was read.
    BeforeFirstEvent,
    /// While events were being read.
    Streaming,
    /// After the child exited.
    AfterExit,
}

impl fmt::Display for CancelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeforeStart => "before start",
            Self::BeforeFirstEvent => "before first event",
            Self::Streaming => "while streaming",
            Self::AfterExit => "after process exit",
        })
    }
}

/// Errors that end a turn without a result.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The event stream was malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The agent reported `turn.failed` or a thread-level `error`.
    #[error("{message}")]
    TurnFailed { message: String },

    /// `codex exec` exited unsuccessfully without reporting a failure event.
    #[error("codex exec exited with code {}: {stderr}", display_code(.code))]
    ProcessFailed { code: Option<i32>, stderr: String },

    /// The turn's cancellation token fired.
    #[error("Turn cancelled {0}")]
    Cancelled(CancelPoint),

    /// `codex exec` could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The output schema could not be prepared.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A pipe to the child was not available.
    #[error("codex exec {0} not available")]
    NoStdio(&'static str),

    /// Reading from or waiting on the child failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl RunError {
    /// Returns true if the turn ended because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if the agent itself reported the failure.
    #[must_use]
    pub fn is_turn_failure(&self) -> bool {
        matches!(self, Self::TurnFailed { .. })
    }
}
