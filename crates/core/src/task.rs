//! Task model - the state machine for one submitted operation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fault::{TaskFault, UnexpectedFault};
use crate::id::TaskId;
use crate::problem::ProblemSet;
use crate::response::OperationResult;
use crate::Time;

/// Task state.
///
/// `NotStarted -> Running -> {Success, Fatal}`. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, worker has not picked it up yet
    #[default]
    NotStarted,
    /// Worker is running the unit of work
    Running,
    /// Unit of work returned a result
    Success,
    /// Unit of work failed
    Fatal,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fatal)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::NotStarted => write!(f, "not_started"),
            TaskState::Running => write!(f, "running"),
            TaskState::Success => write!(f, "success"),
            TaskState::Fatal => write!(f, "fatal"),
        }
    }
}

/// Progress marker a running task advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Position, strictly increasing per task
    pub index: u32,

    /// What the task is doing
    pub name: String,

    /// When the stage began
    pub started_at: Time,

    /// When the stage ended
    pub finished_at: Option<Time>,
}

impl Stage {
    /// Whether the stage has been closed.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// One submitted operation and its tracked execution state.
#[derive(Debug, Clone, Serialize)]
pub struct Task<T> {
    /// Unique identifier
    pub id: TaskId,

    /// Current state
    pub state: TaskState,

    /// Result, set on success or synthesized from a domain fault
    pub result: Option<OperationResult<T>>,

    /// Captured failure, set on fatal
    pub fault: Option<TaskFault>,

    /// Latest stage
    pub stage: Option<Stage>,

    /// When submitted
    pub created_at: Time,

    /// When the worker began
    pub started_at: Option<Time>,

    /// When the unit of work returned
    pub completed_at: Option<Time>,
}

impl<T> Task<T> {
    /// Create a task that has not started.
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::NotStarted,
            result: None,
            fault: None,
            stage: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, from: TaskState, to: TaskState) -> Result<(), CoreError> {
        if self.state != from {
            return Err(CoreError::InvalidStateTransition {
                id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Mark the task as running.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(TaskState::NotStarted, TaskState::Running)?;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Mark the task as succeeded with its result.
    pub fn succeed(&mut self, result: OperationResult<T>) -> Result<(), CoreError> {
        self.transition(TaskState::Running, TaskState::Success)?;
        self.result = Some(result);
        self.complete();
        Ok(())
    }

    /// Mark the task as failed.
    ///
    /// `partial` holds problems reported before the failure; they become the
    /// task's partial result.
    pub fn fail(&mut self, fault: TaskFault, partial: ProblemSet) -> Result<(), CoreError> {
        self.transition(TaskState::Running, TaskState::Fatal)?;
        if !partial.is_empty() {
            self.result = Some(OperationResult::problems_only(partial));
        }
        self.fault = Some(fault);
        self.complete();
        Ok(())
    }

    fn complete(&mut self) {
        let now = chrono::Utc::now();
        self.completed_at = Some(now);
        if let Some(stage) = self.stage.as_mut() {
            if stage.finished_at.is_none() {
                stage.finished_at = Some(now);
            }
        }
    }

    /// Close the current stage and open the next one.
    pub fn new_stage(&mut self, name: impl Into<String>) -> Result<&Stage, CoreError> {
        self.ensure_running()?;
        let now = chrono::Utc::now();
        let index = match self.stage.as_mut() {
            Some(current) => {
                if current.finished_at.is_none() {
                    current.finished_at = Some(now);
                }
                current.index + 1
            }
            None => 0,
        };
        Ok(&*self.stage.insert(Stage {
            index,
            name: name.into(),
            started_at: now,
            finished_at: None,
        }))
    }

    /// Close the current stage, if one is open.
    pub fn finish_stage(&mut self) -> Result<(), CoreError> {
        self.ensure_running()?;
        if let Some(stage) = self.stage.as_mut() {
            if stage.finished_at.is_none() {
                stage.finished_at = Some(chrono::Utc::now());
            }
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.state != TaskState::Running {
            return Err(CoreError::NotRunning {
                id: self.id,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Copy of everything except the result.
    ///
    /// Only a terminal task has a result, so for a task still in flight this
    /// is a complete snapshot.
    pub fn peek(&self) -> Task<T> {
        Task {
            id: self.id,
            state: self.state,
            result: None,
            fault: self.fault.clone(),
            stage: self.stage.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    /// Move the result out, copying everything else.
    pub fn take(&mut self) -> Task<T> {
        let mut task = self.peek();
        task.result = self.result.take();
        task
    }

    /// Turn a terminal task into what a poller should see.
    ///
    /// A domain fault's problems are appended after any partial result's
    /// problems. An unexpected fault is handed back as the error. Call once.
    pub fn finalize(mut self) -> Result<Self, UnexpectedFault> {
        match &self.fault {
            Some(TaskFault::Unexpected(fault)) => Err(fault.clone()),
            Some(TaskFault::Domain(fault)) => {
                let partial = self.result.take().unwrap_or_default();
                self.result = Some(partial.followed_by(fault.problems().clone()));
                Ok(self)
            }
            None => Ok(self),
        }
    }
}
