//! Execution context.
//!
//! Lets code called from inside a unit of work find the task it is running
//! as, without the task being passed down explicitly. Blocking work is bound
//! through a thread-local for the lifetime of its worker; async work through a
//! tokio task-local. Outside any worker everything here is a silent no-op.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use deckhand_core::{CoreError, Problem, Stage, TaskId};
use tracing::debug;

/// Progress reporting against one task, whatever its value type.
pub trait TaskProgress: Send + Sync {
    /// The task being reported against.
    fn id(&self) -> TaskId;

    /// Close the current stage and open a new one.
    fn new_stage(&self, name: String) -> Result<Stage, CoreError>;

    /// Close the current stage.
    fn finish_stage(&self) -> Result<(), CoreError>;

    /// Record a non-fatal problem against the task.
    fn report_problem(&self, problem: Problem) -> Result<(), CoreError>;

    /// Latest stage, if any.
    fn stage(&self) -> Option<Stage>;
}

/// Handle to the task the calling code is running as.
///
/// Reporting is best effort: once the task has left `Running` calls are
/// ignored.
#[derive(Clone)]
pub struct CurrentTask {
    progress: Arc<dyn TaskProgress>,
}

impl CurrentTask {
    /// Wrap a progress sink.
    pub fn new(progress: Arc<dyn TaskProgress>) -> Self {
        Self { progress }
    }

    /// Identity of the task.
    pub fn id(&self) -> TaskId {
        self.progress.id()
    }

    /// Advance to a new named stage.
    pub fn new_stage(&self, name: impl Into<String>) -> Option<Stage> {
        match self.progress.new_stage(name.into()) {
            Ok(stage) => Some(stage),
            Err(e) => {
                debug!("Ignoring stage update: {}", e);
                None
            }
        }
    }

    /// Close the current stage.
    pub fn finish_stage(&self) {
        if let Err(e) = self.progress.finish_stage() {
            debug!("Ignoring stage update: {}", e);
        }
    }

    /// Record a non-fatal problem.
    pub fn report_problem(&self, problem: Problem) {
        if let Err(e) = self.progress.report_problem(problem) {
            debug!("Ignoring reported problem: {}", e);
        }
    }

    /// Latest stage.
    pub fn stage(&self) -> Option<Stage> {
        self.progress.stage()
    }
}

impl std::fmt::Debug for CurrentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentTask").field("id", &self.id()).finish()
    }
}

thread_local! {
    static BOUND_TASK: RefCell<Option<CurrentTask>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static SCOPED_TASK: CurrentTask;
}

/// The task the caller is running as, or `None` outside any worker.
pub fn current_task() -> Option<CurrentTask> {
    SCOPED_TASK
        .try_with(CurrentTask::clone)
        .ok()
        .or_else(|| BOUND_TASK.try_with(|bound| bound.borrow().clone()).ok().flatten())
}

/// Advance the current task to a new stage, if there is one.
pub fn new_stage(name: impl Into<String>) -> Option<Stage> {
    current_task().and_then(|task| task.new_stage(name))
}

/// Close the current task's stage, if there is one.
pub fn finish_stage() {
    if let Some(task) = current_task() {
        task.finish_stage();
    }
}

/// Record a non-fatal problem against the current task, if there is one.
pub fn report_problem(problem: Problem) {
    if let Some(task) = current_task() {
        task.report_problem(problem);
    }
}

/// Restores the previous thread binding when dropped.
pub(crate) struct BindGuard {
    previous: Option<CurrentTask>,
}

/// Bind `task` to the calling thread until the guard drops.
pub(crate) fn bind(task: CurrentTask) -> BindGuard {
    let previous = BOUND_TASK
        .try_with(|bound| bound.replace(Some(task)))
        .ok()
        .flatten();
    BindGuard { previous }
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = BOUND_TASK.try_with(|bound| bound.replace(previous));
    }
}

/// Run `fut` with `task` as the current task.
pub(crate) async fn scope<F: Future>(task: CurrentTask, fut: F) -> F::Output {
    SCOPED_TASK.scope(task, fut).await
}
