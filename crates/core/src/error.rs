//! Core domain errors.

use crate::id::TaskId;
use crate::task::TaskState;

/// Errors raised by the task state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Transition not allowed from the current state.
    #[error("task {id}: invalid state transition {from} -> {to}")]
    InvalidStateTransition {
        /// Task
        id: TaskId,
        /// State the task was in
        from: TaskState,
        /// State that was requested
        to: TaskState,
    },

    /// Progress can only be reported while running.
    #[error("task {id} is not running (state: {state})")]
    NotRunning {
        /// Task
        id: TaskId,
        /// State the task was in
        state: TaskState,
    },
}
