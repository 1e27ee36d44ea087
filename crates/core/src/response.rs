//! Operation result - what a unit of work hands back.

use serde::Serialize;

use crate::problem::ProblemSet;

/// An optional computed value paired with the problems found computing it.
///
/// Immutable once constructed: build a new one instead of editing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult<T> {
    value: Option<T>,
    problems: ProblemSet,
}

impl<T> OperationResult<T> {
    /// Pair a value with problems.
    pub fn new(value: Option<T>, problems: ProblemSet) -> Self {
        Self { value, problems }
    }

    /// A value with no problems.
    pub fn ok(value: T) -> Self {
        Self::new(Some(value), ProblemSet::new())
    }

    /// A value alongside non-fatal problems.
    pub fn with_problems(value: T, problems: ProblemSet) -> Self {
        Self::new(Some(value), problems)
    }

    /// Problems only, no value.
    pub fn problems_only(problems: ProblemSet) -> Self {
        Self::new(None, problems)
    }

    /// Neither value nor problems.
    pub fn empty() -> Self {
        Self::new(None, ProblemSet::new())
    }

    /// The computed value, if any.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Problems found along the way.
    pub fn problems(&self) -> &ProblemSet {
        &self.problems
    }

    /// Split into value and problems.
    pub fn into_parts(self) -> (Option<T>, ProblemSet) {
        (self.value, self.problems)
    }

    /// New result with `earlier` placed before this result's problems.
    pub fn after(self, earlier: ProblemSet) -> Self {
        if earlier.is_empty() {
            return self;
        }
        let mut problems = earlier;
        problems.merge(self.problems);
        Self::new(self.value, problems)
    }

    /// New result with `later` appended after this result's problems.
    pub fn followed_by(self, later: ProblemSet) -> Self {
        let mut problems = self.problems;
        problems.merge(later);
        Self::new(self.value, problems)
    }
}

impl<T> Default for OperationResult<T> {
    fn default() -> Self {
        Self::empty()
    }
}
