//! Controller lifecycle states.

use std::fmt;

use tracing::debug;

/// Where a run is in its lifecycle.
///
/// ```text
/// Idle -> Bootstrapping -> Fetching <-> Flushing -> Finalizing -> Done
///                              \           /
///                               Cancelled -------------------> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Bootstrapping,
    Fetching,
    Flushing,
    Finalizing,
    Cancelled,
    Done,
}

impl PipelineState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use PipelineState::{
            Bootstrapping, Cancelled, Done, Fetching, Finalizing, Flushing, Idle,
        };
        matches!(
            (self, next),
            (Idle, Bootstrapping)
                | (Bootstrapping, Fetching)
                | (Fetching, Flushing | Finalizing | Cancelled)
                | (Flushing, Fetching | Finalizing | Cancelled)
                | (Finalizing | Cancelled, Done)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Bootstrapping => "bootstrapping",
            Self::Fetching => "fetching",
            Self::Flushing => "flushing",
            Self::Finalizing => "finalizing",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state of one run.
#[derive(Debug)]
pub(crate) struct StateMachine {
    state: PipelineState,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    /// Moves to `next`. Illegal transitions are a controller bug.
    pub(crate) fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }
}
