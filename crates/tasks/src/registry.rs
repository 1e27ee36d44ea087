//! Task registry for async operation execution.
//!
//! Every submitted operation gets its own worker and an entry keyed by task
//! id. Callers poll by id; the first poll that sees a terminal state removes
//! the entry and hands back the finished task. Later polls for that id report
//! `NotFound`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use deckhand_core::{Task, TaskId, TaskState, UnexpectedFault};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{RegistryError, Result};
use crate::worker::{self, TaskCell, WorkOutcome};

struct TaskEntry<T> {
    cell: Arc<TaskCell<T>>,
    worker: JoinHandle<()>,
}

/// Process-wide store of submitted operations.
///
/// Cloning is cheap and every clone sees the same tasks. The map lock is only
/// held for membership changes; units of work never run under it.
pub struct TaskRegistry<T> {
    tasks: Arc<Mutex<HashMap<TaskId, TaskEntry<T>>>>,
}

impl<T> Clone for TaskRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<T> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Send + 'static> TaskRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit blocking work.
    ///
    /// The work gets a dedicated blocking thread and starts right away; this
    /// returns without waiting for it.
    pub async fn submit<F>(&self, work: F) -> TaskId
    where
        F: FnOnce() -> WorkOutcome<T> + Send + 'static,
    {
        let id = TaskId::new();
        info!("Scheduling task {}", id);

        let cell = TaskCell::new(id);
        let mut tasks = self.tasks.lock().await;
        let worker = tokio::task::spawn_blocking({
            let cell = Arc::clone(&cell);
            move || worker::run_blocking(cell, work)
        });
        tasks.insert(id, TaskEntry { cell, worker });

        id
    }

    /// Submit async work.
    ///
    /// Same contract as [`submit`](Self::submit), but the work runs as a tokio
    /// task and must not block.
    pub async fn submit_async<Fut>(&self, work: Fut) -> TaskId
    where
        Fut: Future<Output = WorkOutcome<T>> + Send + 'static,
    {
        let id = TaskId::new();
        info!("Scheduling task {}", id);

        let cell = TaskCell::new(id);
        let mut tasks = self.tasks.lock().await;
        let worker = tokio::spawn(worker::run_async(Arc::clone(&cell), work));
        tasks.insert(id, TaskEntry { cell, worker });

        id
    }

    /// Poll a task.
    ///
    /// A task still in flight comes back as a snapshot and stays registered.
    /// A finished task is removed and returned exactly once: with its result
    /// on success or domain failure, or as [`RegistryError::UnexpectedFault`]
    /// when it hit a defect.
    ///
    /// The only await is taking the map lock, so dropping the returned future
    /// never loses a finished task.
    pub async fn poll(&self, id: &TaskId) -> Result<Task<T>> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get(id).ok_or(RegistryError::NotFound(*id))?;

        // Read the worker before the state: once it has exited the state is final.
        let exited = entry.worker.is_finished();
        let state = entry.cell.state();
        if !state.is_terminal() && !exited {
            return Ok(entry.cell.peek());
        }
        let entry = tasks.remove(id).ok_or(RegistryError::NotFound(*id))?;
        drop(tasks);

        info!("Terminating task {}", id);
        if !state.is_terminal() {
            error!("Worker for task {} exited without finishing it", id);
            return Err(RegistryError::UnexpectedFault {
                id: *id,
                fault: UnexpectedFault::new(anyhow!("worker exited without finishing the task")),
            });
        }

        entry.cell.take().finalize().map_err(|fault| {
            error!("Task {} encountered an unexpected fault: {}", id, fault);
            RegistryError::UnexpectedFault { id: *id, fault }
        })
    }

    /// Identities of all tracked tasks, sorted.
    pub async fn list_ids(&self) -> Vec<TaskId> {
        let tasks = self.tasks.lock().await;
        let mut ids: Vec<_> = tasks.keys().copied().collect();
        ids.sort();
        debug!("Listing {} task(s)", ids.len());
        ids
    }

    /// Current state of a tracked task, without finalizing it.
    pub async fn state(&self, id: &TaskId) -> Option<TaskState> {
        let tasks = self.tasks.lock().await;
        tasks.get(id).map(|entry| entry.cell.state())
    }

    /// Number of tracked tasks.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Whether nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{self, TaskProgress};
    use deckhand_core::{DomainFault, OperationResult, Problem, ProblemSet, Severity, TaskFault};
    use std::sync::mpsc;
    use std::time::Duration;

    async fn wait_until_terminal<T: Send + 'static>(registry: &TaskRegistry<T>, id: &TaskId) {
        for _ in 0..500 {
            match registry.state(id).await {
                Some(state) if state.is_terminal() => return,
                Some(_) => tokio::time::sleep(Duration::from_millis(5)).await,
                None => panic!("task {} vanished before finishing", id),
            }
        }
        panic!("task {} did not finish in time", id);
    }

    #[tokio::test]
    async fn test_success_then_not_found() {
        let registry = TaskRegistry::new();
        let id = registry
            .submit(|| {
                std::thread::sleep(Duration::from_millis(50));
                Ok(OperationResult::ok(42))
            })
            .await;

        for _ in 0..500 {
            if registry.state(&id).await != Some(TaskState::NotStarted) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let early = registry.poll(&id).await.unwrap();
        assert_eq!(early.state, TaskState::Running);
        assert!(early.result.is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        wait_until_terminal(&registry, &id).await;

        let done = registry.poll(&id).await.unwrap();
        assert_eq!(done.state, TaskState::Success);
        assert_eq!(done.result.unwrap().value(), Some(&42));

        let again = registry.poll(&id).await.unwrap_err();
        assert!(again.is_not_found());
    }

    #[tokio::test]
    async fn test_domain_fault_returns_problems() {
        let registry = TaskRegistry::<u32>::new();
        let problems = ProblemSet::from(vec![
            Problem::error("bad config"),
            Problem::builder(Severity::Fatal, "no version in BOM")
                .remediation("set a version")
                .build(),
        ]);
        let expected = problems.clone();

        let id = registry
            .submit(move || Err(DomainFault::new(problems).into()))
            .await;
        wait_until_terminal(&registry, &id).await;

        let task = registry.poll(&id).await.unwrap();
        assert_eq!(task.state, TaskState::Fatal);
        assert!(task.fault.as_ref().unwrap().is_domain());
        let result = task.result.unwrap();
        assert!(result.value().is_none());
        assert_eq!(result.problems(), &expected);

        assert!(registry.poll(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_domain_fault_after_reported_warnings() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry
            .submit(|| {
                context::report_problem(Problem::warning("deprecated field"));
                Err(DomainFault::from(Problem::error("bad config")).into())
            })
            .await;
        wait_until_terminal(&registry, &id).await;

        let task = registry.poll(&id).await.unwrap();
        let messages: Vec<_> = task
            .result
            .unwrap()
            .problems()
            .iter()
            .map(|p| p.message.clone())
            .collect();
        assert_eq!(messages, vec!["deprecated field", "bad config"]);
    }

    #[tokio::test]
    async fn test_unexpected_fault_escalates_once() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry
            .submit(|| Err(anyhow!("profile template missing").into()))
            .await;
        wait_until_terminal(&registry, &id).await;

        match registry.poll(&id).await {
            Err(RegistryError::UnexpectedFault { id: failed, fault }) => {
                assert_eq!(failed, id);
                assert_eq!(fault.to_string(), "profile template missing");
            }
            other => panic!("expected unexpected fault, got {:?}", other.map(|t| t.state)),
        }

        assert!(registry.poll(&id).await.unwrap_err().is_not_found());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_panic_is_unexpected_fault() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry.submit(|| panic!("index out of bounds")).await;
        wait_until_terminal(&registry, &id).await;

        let err = registry.poll(&id).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnexpectedFault { .. }));
        assert!(err.to_string().contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found_without_side_effects() {
        let registry = TaskRegistry::<u32>::new();
        let known = registry
            .submit(|| Ok(OperationResult::ok(1)))
            .await;
        let unknown = TaskId::new();

        for _ in 0..3 {
            assert!(registry.poll(&unknown).await.unwrap_err().is_not_found());
        }
        assert_eq!(registry.list_ids().await, vec![known]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_polls_deliver_exactly_once() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry.submit(|| Ok(OperationResult::ok(7))).await;
        wait_until_terminal(&registry, &id).await;

        let pollers: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.poll(&id).await })
            })
            .collect();

        let mut delivered = 0;
        let mut not_found = 0;
        for poller in pollers {
            match poller.await.unwrap() {
                Ok(task) => {
                    assert_eq!(task.result.unwrap().value(), Some(&7));
                    delivered += 1;
                }
                Err(e) => {
                    assert!(e.is_not_found());
                    not_found += 1;
                }
            }
        }
        assert_eq!(delivered, 1);
        assert_eq!(not_found, 15);
    }

    #[tokio::test]
    async fn test_list_ids_tracks_membership() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry.submit(|| Ok(OperationResult::ok(1))).await;
        assert!(registry.list_ids().await.contains(&id));

        wait_until_terminal(&registry, &id).await;
        assert!(registry.list_ids().await.contains(&id));

        registry.poll(&id).await.unwrap();
        assert!(!registry.list_ids().await.contains(&id));
    }

    #[tokio::test]
    async fn test_concurrent_operations_are_independent() {
        let registry = TaskRegistry::<String>::new();
        let validate = registry
            .submit(|| {
                std::thread::sleep(Duration::from_millis(20));
                Ok(OperationResult::ok("valid".to_string()))
            })
            .await;
        let deploy = registry
            .submit(|| Err(DomainFault::from(Problem::error("cluster unreachable")).into()))
            .await;

        let ids = registry.list_ids().await;
        assert!(ids.contains(&validate) && ids.contains(&deploy));

        wait_until_terminal(&registry, &deploy).await;
        let deployed = registry.poll(&deploy).await.unwrap();
        assert_eq!(deployed.state, TaskState::Fatal);

        wait_until_terminal(&registry, &validate).await;
        let validated = registry.poll(&validate).await.unwrap();
        assert_eq!(validated.state, TaskState::Success);
        assert_eq!(validated.result.unwrap().value().map(String::as_str), Some("valid"));
    }

    #[tokio::test]
    async fn test_running_snapshot_shows_stage() {
        let registry = TaskRegistry::<u32>::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let id = registry
            .submit(move || {
                context::new_stage("Generating profiles");
                release_rx.recv().ok();
                context::new_stage("Writing profiles");
                Ok(OperationResult::ok(3))
            })
            .await;

        let mut snapshot = registry.poll(&id).await.unwrap();
        for _ in 0..500 {
            if snapshot.stage.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            snapshot = registry.poll(&id).await.unwrap();
        }
        assert_eq!(snapshot.state, TaskState::Running);
        let stage = snapshot.stage.unwrap();
        assert_eq!(stage.index, 0);
        assert_eq!(stage.name, "Generating profiles");

        release_tx.send(()).unwrap();
        wait_until_terminal(&registry, &id).await;

        let done = registry.poll(&id).await.unwrap();
        let stage = done.stage.unwrap();
        assert_eq!(stage.index, 1);
        assert!(stage.is_finished());
    }

    #[tokio::test]
    async fn test_submit_async_uses_task_context() {
        async fn render_profiles() -> u32 {
            tokio::task::yield_now().await;
            context::new_stage("Rendering");
            context::current_task().map(|_| 1).unwrap_or(0)
        }

        let registry = TaskRegistry::<u32>::new();
        let id = registry
            .submit_async(async {
                let bound = render_profiles().await;
                Ok(OperationResult::ok(bound))
            })
            .await;
        wait_until_terminal(&registry, &id).await;

        let task = registry.poll(&id).await.unwrap();
        assert_eq!(task.result.unwrap().value(), Some(&1));
        assert_eq!(task.stage.unwrap().name, "Rendering");
    }

    #[tokio::test]
    async fn test_async_unexpected_fault() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry
            .submit_async(async { Err(TaskFault::from(anyhow!("connection reset"))) })
            .await;
        wait_until_terminal(&registry, &id).await;

        assert!(matches!(
            registry.poll(&id).await,
            Err(RegistryError::UnexpectedFault { .. })
        ));
    }

    #[tokio::test]
    async fn test_finished_task_serializes() {
        let registry = TaskRegistry::<u32>::new();
        let id = registry
            .submit(|| Err(DomainFault::from(Problem::error("bad config")).into()))
            .await;
        wait_until_terminal(&registry, &id).await;

        let task = registry.poll(&id).await.unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["state"], "FATAL");
        assert_eq!(json["result"]["problems"][0]["message"], "bad config");
        assert_eq!(json["fault"]["kind"], "domain");
    }

    async fn track<T: Send + 'static>(
        registry: &TaskRegistry<T>,
        cell: Arc<TaskCell<T>>,
        worker: JoinHandle<()>,
    ) -> TaskId {
        let id = cell.id();
        registry.tasks.lock().await.insert(id, TaskEntry { cell, worker });
        id
    }

    #[tokio::test]
    async fn test_dropped_poll_keeps_finished_task() {
        let registry = TaskRegistry::<u32>::new();
        let cell = TaskCell::new(TaskId::new());
        worker::run_blocking(Arc::clone(&cell), || Ok(OperationResult::ok(9)));

        // Result is published but the worker has not exited yet.
        let (exit_tx, exit_rx) = tokio::sync::oneshot::channel::<()>();
        let lingering = tokio::spawn(async move {
            exit_rx.await.ok();
        });
        let id = track(&registry, cell, lingering).await;

        let held = registry.tasks.lock().await;
        let dropped = tokio::time::timeout(Duration::from_millis(20), registry.poll(&id)).await;
        assert!(dropped.is_err());
        drop(held);

        let delivered = tokio::time::timeout(Duration::from_millis(500), registry.poll(&id))
            .await
            .expect("finished task should not wait on its worker")
            .unwrap();
        assert_eq!(delivered.state, TaskState::Success);
        assert_eq!(delivered.result.unwrap().value(), Some(&9));

        assert!(registry.poll(&id).await.unwrap_err().is_not_found());
        exit_tx.send(()).ok();
    }

    #[tokio::test]
    async fn test_worker_gone_before_finishing_is_unexpected() {
        let registry = TaskRegistry::<u32>::new();
        let worker = tokio::spawn(std::future::pending::<()>());
        worker.abort();
        while !worker.is_finished() {
            tokio::task::yield_now().await;
        }
        let id = track(&registry, TaskCell::new(TaskId::new()), worker).await;

        match registry.poll(&id).await {
            Err(RegistryError::UnexpectedFault { id: failed, fault }) => {
                assert_eq!(failed, id);
                assert!(fault.to_string().contains("without finishing"));
            }
            other => panic!("expected unexpected fault, got {:?}", other.map(|t| t.state)),
        }
        assert!(registry.poll(&id).await.unwrap_err().is_not_found());
    }
}
