//! Task execution (async operation registry)
//!
//! Runs submitted units of work on their own workers, tracks them by id, and
//! lets callers poll for the outcome without holding a connection open.
//! Code running inside a unit of work reaches its task through [`context`].

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod registry;
mod worker;

pub use context::{current_task, CurrentTask, TaskProgress};
pub use error::{RegistryError, Result};
pub use registry::TaskRegistry;
pub use worker::WorkOutcome;
