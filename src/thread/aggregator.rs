//! Turn aggregation state machine.
//!
//! A [`TurnAggregator`] consumes the events of one turn in arrival order
//! and resolves to a [`TurnResult`] or a [`RunError::TurnFailed`].

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::exec::{RunError, ThreadEvent, ThreadItem, Usage};

/// Current state of a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    #[default]
    Start,
    Streaming,
    Completed,
    Failed(String),
}

impl TurnState {
    /// Returns true once no further events will be applied.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Outcome of a successful turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Completed items in completion order.
    pub items: Vec<ThreadItem>,
    /// Text of the most recent completed agent message, empty if none.
    pub final_response: String,
    /// Usage from `turn.completed`, if the turn reported one.
    pub usage: Option<Usage>,
}

/// Accumulates the events of one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnAggregator {
    state: TurnState,
    thread_id: Option<String>,
    items: Vec<ThreadItem>,
    final_response: String,
    usage: Option<Usage>,
}

impl TurnAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Thread id announced by `thread.started`, if any.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Items completed so far.
    #[must_use]
    pub fn items(&self) -> &[ThreadItem] {
        &self.items
    }

    fn transition(&mut self, new_state: TurnState) {
        tracing::debug!(from = ?self.state, to = ?new_state, "Turn state transition");
        self.state = new_state;
    }

    /// Apply one event.
    ///
    /// Returns `Break` when the turn has failed and the caller should stop
    /// reading. Events applied after a terminal state are ignored.
    pub fn apply(&mut self, event: &ThreadEvent) -> ControlFlow<()> {
        if self.state.is_terminal() {
            return ControlFlow::Break(());
        }
        if self.state == TurnState::Start {
            self.transition(TurnState::Streaming);
        }

        match event {
            ThreadEvent::ThreadStarted(started) => {
                self.thread_id = Some(started.thread_id.clone());
            }
            ThreadEvent::ItemCompleted(completed) => {
                if let Some(text) = completed.item.agent_text() {
                    self.final_response = text.to_string();
                }
                self.items.push(completed.item.clone());
            }
            ThreadEvent::TurnCompleted(completed) => {
                self.usage = Some(completed.usage);
            }
            ThreadEvent::TurnFailed(failed) => {
                self.transition(TurnState::Failed(failed.error.message.clone()));
                return ControlFlow::Break(());
            }
            ThreadEvent::Error(error) => {
                self.transition(TurnState::Failed(error.message.clone()));
                return ControlFlow::Break(());
            }
            ThreadEvent::TurnStarted | ThreadEvent::ItemStarted(_) | ThreadEvent::ItemUpdated(_) => {}
        }

        ControlFlow::Continue(())
    }

    /// Resolve the turn after the stream ended or a failure was applied.
    ///
    /// # Errors
    ///
    /// Returns `RunError::TurnFailed` with the reported message if a
    /// `turn.failed` or `error` event was applied.
    pub fn finish(mut self) -> Result<TurnResult, RunError> {
        if let TurnState::Failed(message) = &self.state {
            return Err(RunError::TurnFailed {
                message: message.clone(),
            });
        }
        self.transition(TurnState::Completed);

        Ok(TurnResult {
            items: self.items,
            final_response: self.final_response,
            usage: self.usage,
        })
    }
}
