//! Registry errors.

use deckhand_core::{TaskId, UnexpectedFault};

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by [`crate::TaskRegistry::poll`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Never submitted, or already finalized by an earlier poll.
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    /// The task hit a defect rather than a domain failure.
    #[error("Unexpected failure while running task {id}: {fault}")]
    UnexpectedFault {
        /// Task that failed
        id: TaskId,
        /// The original failure
        fault: UnexpectedFault,
    },
}

impl RegistryError {
    /// Whether this is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}
