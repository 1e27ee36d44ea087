//! Deckhand core data models.
//!
//! This crate defines the records exchanged between a unit of work, the task
//! registry that runs it, and the caller polling for its outcome: problems,
//! operation results, faults, and the task state machine itself.

#![warn(missing_docs)]

// Identity
mod id;

// Diagnostics
mod problem;
mod response;
mod fault;

// Task state machine
mod task;
mod error;

// Re-exports
pub use id::*;

pub use problem::{Problem, ProblemBuilder, ProblemSet, Severity};
pub use response::OperationResult;
pub use fault::{DomainFault, TaskFault, UnexpectedFault};

pub use task::{Stage, Task, TaskState};
pub use error::CoreError;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
