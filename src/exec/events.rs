//! Event types from `codex exec --experimental-json` output.
//!
//! Each non-empty stdout line is one JSON object whose `type` field picks
//! a [`ThreadEvent`] variant. Unknown types are a decode failure; there is
//! no catch-all variant.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ThreadItem;

/// Token accounting reported when a turn completes.
///
/// Missing, `null` or non-numeric counters decode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "count_or_zero")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub cached_input_tokens: u64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub output_tokens: u64,
}

impl Usage {
    /// Create a usage record.
    #[must_use]
    pub fn new(input_tokens: u64, cached_input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            cached_input_tokens,
            output_tokens,
        }
    }

    /// Add another usage record into this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.cached_input_tokens = self
            .cached_input_tokens
            .saturating_add(other.cached_input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

fn count_or_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(coerce_count(&Value::deserialize(deserializer)?))
}

/// Read a token counter leniently: integers, floats and numeric strings
/// are accepted; anything else, including negatives, is zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coerce_count(value: &Value) -> u64 {
    let from_float = |f: f64| (f.is_finite() && f >= 0.0).then(|| f as u64);
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(from_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    }
    .unwrap_or(0)
}

/// A `usage` value that is not an object decodes as all zeros.
fn usage_or_default<'de, D>(deserializer: D) -> Result<Usage, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(Usage::default());
    }
    Ok(Usage::deserialize(value).unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Error payload of a `turn.failed` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnError {
    #[serde(default)]
    pub message: String,
}

/// `thread.started` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStartedEvent {
    /// Identifier used to resume the thread on a later turn.
    pub thread_id: String,
}

/// `turn.completed` payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCompletedEvent {
    #[serde(default, deserialize_with = "usage_or_default")]
    pub usage: Usage,
}

/// `turn.failed` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailedEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: TurnError,
}

/// Payload shared by the `item.*` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEvent {
    pub item: ThreadItem,
}

/// Thread-level `error` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadErrorEvent {
    #[serde(default)]
    pub message: String,
}

/// Events emitted by `codex exec` on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted(ThreadStartedEvent),
    #[serde(rename = "turn.started")]
    TurnStarted,
    #[serde(rename = "turn.completed")]
    TurnCompleted(TurnCompletedEvent),
    #[serde(rename = "turn.failed")]
    TurnFailed(TurnFailedEvent),
    #[serde(rename = "item.started")]
    ItemStarted(ItemEvent),
    #[serde(rename = "item.updated")]
    ItemUpdated(ItemEvent),
    #[serde(rename = "item.completed")]
    ItemCompleted(ItemEvent),
    #[serde(rename = "error")]
    Error(ThreadErrorEvent),
}

impl ThreadEvent {
    /// Returns true for events that end the turn unsuccessfully.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TurnFailed(_) | Self::Error(_))
    }

    /// Returns the thread id if this is a `thread.started` event.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted(started) => Some(&started.thread_id),
            _ => None,
        }
    }

    /// Returns the item carried by an `item.*` event.
    #[must_use]
    pub fn item(&self) -> Option<&ThreadItem> {
        match self {
            Self::ItemStarted(event) | Self::ItemUpdated(event) | Self::ItemCompleted(event) => {
                Some(&event.item)
            }
            _ => None,
        }
    }

    /// Wire name of the event type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThreadStarted(_) => "thread.started",
            Self::TurnStarted => "turn.started",
            Self::TurnCompleted(_) => "turn.completed",
            Self::TurnFailed(_) => "turn.failed",
            Self::ItemStarted(_) => "item.started",
            Self::ItemUpdated(_) => "item.updated",
            Self::ItemCompleted(_) => "item.completed",
            Self::Error(_) => "error",
        }
    }
}
