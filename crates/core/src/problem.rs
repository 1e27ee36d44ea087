//! Problem model - diagnostics produced while running an operation.

use serde::{Deserialize, Serialize};

use crate::fault::DomainFault;

/// Severity level.
///
/// Ordered from least to most severe, so `max()` over a set of problems
/// yields the worst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Worth telling the user about, the operation can still proceed
    Warning,
    /// The requested change is invalid
    Error,
    /// The operation cannot continue at all
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// How bad it is
    pub severity: Severity,

    /// What went wrong
    pub message: String,

    /// What the user can do about it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Problem {
    /// Create a problem without remediation.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            remediation: None,
        }
    }

    /// Start building a problem.
    pub fn builder(severity: Severity, message: impl Into<String>) -> ProblemBuilder {
        ProblemBuilder::new(severity, message)
    }

    /// Shorthand for a warning.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Shorthand for an error.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Shorthand for a fatal problem.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(remediation) = &self.remediation {
            write!(f, " ({})", remediation)?;
        }
        Ok(())
    }
}

/// Builder for [`Problem`].
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    problem: Problem,
}

impl ProblemBuilder {
    /// Create a new builder.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            problem: Problem::new(severity, message),
        }
    }

    /// Set remediation.
    pub fn remediation(mut self, remediation: impl Into<String>) -> Self {
        self.problem.remediation = Some(remediation.into());
        self
    }

    /// Finish the problem.
    pub fn build(self) -> Problem {
        self.problem
    }
}

/// Ordered collection of problems.
///
/// Insertion order is detection order. Nothing is ever deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one problem.
    pub fn add(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    /// Append every problem of `other`, after the existing ones.
    pub fn merge(&mut self, other: ProblemSet) {
        self.problems.extend(other.problems);
    }

    /// Number of problems.
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// Whether the set has no problems.
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Iterate in detection order.
    pub fn iter(&self) -> std::slice::Iter<'_, Problem> {
        self.problems.iter()
    }

    /// Borrow the problems as a slice.
    pub fn as_slice(&self) -> &[Problem] {
        &self.problems
    }

    /// The worst severity present, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.problems.iter().map(|p| p.severity).max()
    }

    /// Fail with the whole set when any problem is at least `threshold`.
    pub fn ensure_below(&self, threshold: Severity) -> Result<(), DomainFault> {
        match self.max_severity() {
            Some(worst) if worst >= threshold => Err(DomainFault::new(self.clone())),
            _ => Ok(()),
        }
    }
}

impl From<Vec<Problem>> for ProblemSet {
    fn from(problems: Vec<Problem>) -> Self {
        Self { problems }
    }
}

impl From<Problem> for ProblemSet {
    fn from(problem: Problem) -> Self {
        Self {
            problems: vec![problem],
        }
    }
}

impl FromIterator<Problem> for ProblemSet {
    fn from_iter<I: IntoIterator<Item = Problem>>(iter: I) -> Self {
        Self {
            problems: iter.into_iter().collect(),
        }
    }
}

impl Extend<Problem> for ProblemSet {
    fn extend<I: IntoIterator<Item = Problem>>(&mut self, iter: I) {
        self.problems.extend(iter);
    }
}

impl IntoIterator for ProblemSet {
    type Item = Problem;
    type IntoIter = std::vec::IntoIter<Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.into_iter()
    }
}

impl<'a> IntoIterator for &'a ProblemSet {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.iter()
    }
}
