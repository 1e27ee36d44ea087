//! Worker side of a task: the shared record and the catch boundary.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use deckhand_core::{
    CoreError, OperationResult, Problem, ProblemSet, Stage, Task, TaskFault, TaskId, TaskState,
    UnexpectedFault,
};
use futures::FutureExt;
use tracing::{info, warn};

use crate::context::{self, CurrentTask, TaskProgress};

/// What a unit of work produces.
pub type WorkOutcome<T> = Result<OperationResult<T>, TaskFault>;

struct Inner<T> {
    task: Task<T>,
    /// Problems reported through the execution context while running
    reported: ProblemSet,
}

/// Task record shared between its worker, its registry entry and any
/// execution context handles.
///
/// The lock is only held to read or write fields, never while the unit of
/// work runs.
pub(crate) struct TaskCell<T> {
    id: TaskId,
    inner: Mutex<Inner<T>>,
}

impl<T> TaskCell<T> {
    pub(crate) fn new(id: TaskId) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(Inner {
                task: Task::new(id),
                reported: ProblemSet::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> TaskState {
        self.lock().task.state
    }

    pub(crate) fn peek(&self) -> Task<T> {
        self.lock().task.peek()
    }

    pub(crate) fn take(&self) -> Task<T> {
        self.lock().task.take()
    }

    fn start(&self) {
        info!("Starting task {}", self.id);
        if let Err(e) = self.lock().task.start() {
            warn!("{}", e);
        }
    }

    fn complete(&self, outcome: WorkOutcome<T>) {
        {
            let mut inner = self.lock();
            let reported = std::mem::take(&mut inner.reported);
            let applied = match outcome {
                Ok(result) => inner.task.succeed(result.after(reported)),
                Err(fault) => {
                    warn!("Task {} failed: {}", self.id, fault);
                    inner.task.fail(fault, reported)
                }
            };
            if let Err(e) = applied {
                warn!("{}", e);
            }
        }
        info!("Task {} completed", self.id);
    }
}

impl<T: Send> TaskProgress for TaskCell<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn new_stage(&self, name: String) -> Result<Stage, CoreError> {
        self.lock().task.new_stage(name).cloned()
    }

    fn finish_stage(&self) -> Result<(), CoreError> {
        self.lock().task.finish_stage()
    }

    fn report_problem(&self, problem: Problem) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.task.state != TaskState::Running {
            return Err(CoreError::NotRunning {
                id: self.id,
                state: inner.task.state,
            });
        }
        inner.reported.add(problem);
        Ok(())
    }

    fn stage(&self) -> Option<Stage> {
        self.lock().task.stage.clone()
    }
}

/// Run blocking work on the calling thread under the task's context.
pub(crate) fn run_blocking<T, F>(cell: Arc<TaskCell<T>>, work: F)
where
    T: Send + 'static,
    F: FnOnce() -> WorkOutcome<T>,
{
    cell.start();
    let outcome = {
        let _bound = context::bind(CurrentTask::new(cell.clone()));
        panic::catch_unwind(AssertUnwindSafe(work))
            .unwrap_or_else(|payload| Err(UnexpectedFault::from_panic(payload).into()))
    };
    cell.complete(outcome);
}

/// Drive async work under the task's context.
pub(crate) async fn run_async<T, Fut>(cell: Arc<TaskCell<T>>, work: Fut)
where
    T: Send + 'static,
    Fut: Future<Output = WorkOutcome<T>>,
{
    cell.start();
    let outcome = context::scope(
        CurrentTask::new(cell.clone()),
        AssertUnwindSafe(work).catch_unwind(),
    )
    .await
    .unwrap_or_else(|payload| Err(UnexpectedFault::from_panic(payload).into()));
    cell.complete(outcome);
}
