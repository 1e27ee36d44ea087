//! Failure classification for units of work.
//!
//! A unit of work either fails for a reason it understands and can explain to
//! the user ([`DomainFault`]) or because something went wrong that nobody
//! anticipated ([`UnexpectedFault`]). The two travel together as [`TaskFault`].

use std::any::Any;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::problem::{Problem, ProblemSet};

/// Expected failure carrying the problems that explain it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("operation failed with {} problem(s)", .problems.len())]
pub struct DomainFault {
    problems: ProblemSet,
}

impl DomainFault {
    /// Create a fault from a problem set.
    ///
    /// An empty set is replaced with a single fatal problem; a domain fault
    /// always explains itself.
    pub fn new(problems: ProblemSet) -> Self {
        if problems.is_empty() {
            return Self {
                problems: ProblemSet::from(Problem::fatal(
                    "operation failed without reporting any problems",
                )),
            };
        }
        Self { problems }
    }

    /// Problems describing the failure.
    pub fn problems(&self) -> &ProblemSet {
        &self.problems
    }
}

impl From<Problem> for DomainFault {
    fn from(problem: Problem) -> Self {
        Self::new(ProblemSet::from(problem))
    }
}

impl From<ProblemSet> for DomainFault {
    fn from(problems: ProblemSet) -> Self {
        Self::new(problems)
    }
}

impl Serialize for DomainFault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.problems.serialize(serializer)
    }
}

/// Unforeseen failure: a defect, not a validation outcome.
///
/// Shared so task snapshots can be cloned without losing the original error.
#[derive(Debug, Clone)]
pub struct UnexpectedFault(Arc<anyhow::Error>);

impl UnexpectedFault {
    /// Wrap an error.
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Build from a panic payload caught at a worker boundary.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new(anyhow::anyhow!("unit of work panicked: {}", message))
    }
}

impl std::fmt::Display for UnexpectedFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl Serialize for UnexpectedFault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Why a unit of work did not produce a result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskFault {
    /// Understood failure with problems for the user
    Domain(DomainFault),
    /// Defect or unforeseen condition
    Unexpected(UnexpectedFault),
}

impl TaskFault {
    /// Whether this is a domain fault.
    pub fn is_domain(&self) -> bool {
        matches!(self, TaskFault::Domain(_))
    }

    /// Problems carried by a domain fault.
    pub fn problems(&self) -> Option<&ProblemSet> {
        match self {
            TaskFault::Domain(fault) => Some(fault.problems()),
            TaskFault::Unexpected(_) => None,
        }
    }
}

impl std::fmt::Display for TaskFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFault::Domain(fault) => std::fmt::Display::fmt(fault, f),
            TaskFault::Unexpected(fault) => std::fmt::Display::fmt(fault, f),
        }
    }
}

impl From<DomainFault> for TaskFault {
    fn from(fault: DomainFault) -> Self {
        TaskFault::Domain(fault)
    }
}

impl From<UnexpectedFault> for TaskFault {
    fn from(fault: UnexpectedFault) -> Self {
        TaskFault::Unexpected(fault)
    }
}

impl From<anyhow::Error> for TaskFault {
    fn from(error: anyhow::Error) -> Self {
        TaskFault::Unexpected(UnexpectedFault::new(error))
    }
}
