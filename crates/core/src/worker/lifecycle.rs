//! Worker lifecycle state machine.
//!
//! ```text
//! installing ──► waiting ──► activating ──► active
//!      │                          │            │
//!      └──────────► redundant ◄───┴────────────┘
//! ```
//!
//! One [`LifecycleManager`] owns the state and validates every transition.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        }
    }

    /// Whether `self → next` is a legal step.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Installing, Waiting)
                | (Waiting, Activating)
                | (Activating, Active)
                | (Installing | Waiting | Activating | Active, Redundant)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the worker's lifecycle state.
#[derive(Debug)]
pub struct LifecycleManager {
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
}

impl LifecycleManager {
    /// A manager in the `installing` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(WorkerState::Installing);
        Self { state, skip_waiting: AtomicBool::new(false) }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    #[cfg(test)]
    pub(crate) fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Move to `next`, rejecting steps the state machine does not allow.
    pub fn transition(&self, next: WorkerState) -> Result<(), Error> {
        let mut rejected = None;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::info!(from = %current, to = %next, "worker state change");
                *current = next;
                true
            } else {
                rejected = Some(*current);
                false
            }
        });

        match rejected {
            Some(from) => Err(Error::InvalidTransition { from: from.to_string(), to: next.to_string() }),
            None => Ok(()),
        }
    }

    /// Ask to activate as soon as installation finishes instead of waiting
    /// for existing clients to go away.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        tracing::debug!("skip waiting requested");
    }

    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Active
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
