use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sweep_core::{RunOutcome, RunResult, StageError, Task, TaskId, TaskStatus};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::executor::StageExecutor;

const EVENT_CAPACITY: usize = 256;

/// Lifecycle notification emitted by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Started {
        task_id: TaskId,
        running: usize,
    },
    Finished {
        task_id: TaskId,
        outcome: RunOutcome,
        error: Option<String>,
        completed: usize,
        total: usize,
    },
}

/// Results of one scheduling pass: blocked tasks first, then the scheduled
/// ones in generation order.
#[derive(Debug, Clone)]
pub struct SchedulerRun {
    pub results: Vec<RunResult>,
    pub peak_running: usize,
}

/// Bounded worker pool: `max_jobs` workers, so at most that many tasks run
/// at once.
pub struct Scheduler {
    executor: Arc<StageExecutor>,
    max_jobs: usize,
    cancel: CancellationToken,
    events: broadcast::Sender<TaskEvent>,
    statuses: Arc<RwLock<HashMap<TaskId, TaskStatus>>>,
}

impl Scheduler {
    pub fn new(executor: Arc<StageExecutor>, max_jobs: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            executor,
            max_jobs: max_jobs.max(1),
            cancel: CancellationToken::new(),
            events,
            statuses: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub async fn status_of(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.statuses.read().await.get(task_id).copied()
    }

    /// Run every task to a terminal state. Tasks are queued in submission
    /// order and pulled by a fixed set of workers; failures never stop the
    /// remaining tasks, only cancellation does.
    pub async fn run(&self, tasks: Vec<Task>) -> SchedulerRun {
        self.run_with_blocked(tasks, Vec::new()).await
    }

    /// Like [`Scheduler::run`], with `blocked` tasks that already failed
    /// before admission. They are announced as finished up front so that
    /// progress totals cover the whole grid.
    pub async fn run_with_blocked(
        &self,
        tasks: Vec<Task>,
        blocked: Vec<RunResult>,
    ) -> SchedulerRun {
        let total = tasks.len() + blocked.len();
        {
            let mut statuses = self.statuses.write().await;
            statuses.clear();
            for task in &tasks {
                statuses.insert(task.id(), TaskStatus::Pending);
            }
            for result in &blocked {
                statuses.insert(result.task_id.clone(), TaskStatus::Pending);
            }
        }

        let completed = Arc::new(AtomicUsize::new(0));
        for result in &blocked {
            set_status(&self.statuses, &result.task_id, TaskStatus::Failed).await;
            announce_finished(&self.events, &completed, total, result);
        }

        let worker_count = self.max_jobs.min(tasks.len().max(1));
        tracing::info!("Scheduling {} task(s) on {} worker(s)", tasks.len(), worker_count);

        let (queue_tx, queue_rx) = mpsc::channel::<Task>(self.max_jobs);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (results_tx, mut results_rx) = mpsc::channel::<RunResult>(self.max_jobs);
        let gauge = Arc::new(RunningGauge::default());

        let mut workers = Vec::with_capacity(worker_count);
        for slot in 0..worker_count {
            let worker = Worker {
                executor: Arc::clone(&self.executor),
                statuses: Arc::clone(&self.statuses),
                events: self.events.clone(),
                cancel: self.cancel.clone(),
                gauge: Arc::clone(&gauge),
                completed: Arc::clone(&completed),
                total,
            };
            let span = tracing::info_span!("worker", slot);
            workers.push(tokio::spawn(
                worker
                    .run(Arc::clone(&queue_rx), results_tx.clone())
                    .instrument(span),
            ));
        }
        drop(results_tx);
        drop(queue_rx);

        let submitted: Vec<Task> = tasks.clone();
        let feed = async move {
            for task in tasks {
                if queue_tx.send(task).await.is_err() {
                    tracing::error!("Every worker exited before the queue drained");
                    break;
                }
            }
        };
        let collect = async {
            let mut results = HashMap::with_capacity(total);
            while let Some(result) = results_rx.recv().await {
                results.insert(result.task_id.clone(), result);
            }
            results
        };
        let ((), mut results) = tokio::join!(feed, collect);

        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!("Worker aborted: {}", e);
            }
        }

        // Tasks lost with a panicked worker still get a terminal result.
        let mut ordered = blocked;
        ordered.reserve(submitted.len());
        for task in submitted {
            match results.remove(&task.id()) {
                Some(result) => ordered.push(result),
                None => {
                    let err = StageError::Internal("worker panicked".to_string());
                    tracing::error!("Task {} has no result: {}", task.id(), err);
                    let result = RunResult::failure(task, &err);
                    set_status(&self.statuses, &result.task_id, TaskStatus::Failed).await;
                    ordered.push(result);
                }
            }
        }

        SchedulerRun {
            results: ordered,
            peak_running: gauge.peak(),
        }
    }
}

type TaskQueue = Arc<Mutex<mpsc::Receiver<Task>>>;

struct Worker {
    executor: Arc<StageExecutor>,
    statuses: Arc<RwLock<HashMap<TaskId, TaskStatus>>>,
    events: broadcast::Sender<TaskEvent>,
    cancel: CancellationToken,
    gauge: Arc<RunningGauge>,
    completed: Arc<AtomicUsize>,
    total: usize,
}

impl Worker {
    /// Pull tasks until the queue closes. After cancellation the remaining
    /// tasks are drained and recorded as cancelled.
    async fn run(self, queue: TaskQueue, results: mpsc::Sender<RunResult>) {
        loop {
            let next = queue.lock().await.recv().await;
            let Some(task) = next else {
                break;
            };

            let result = if self.cancel.is_cancelled() {
                self.finish(RunResult::failure(task, &StageError::Cancelled)).await
            } else {
                self.execute(task).await
            };

            if results.send(result).await.is_err() {
                break;
            }
        }
    }

    async fn execute(&self, task: Task) -> RunResult {
        let task_id = task.id();
        set_status(&self.statuses, &task_id, TaskStatus::Running).await;
        let slot = self.gauge.enter();
        tracing::info!("Started {} ({} running)", task, slot.running);
        let _ = self.events.send(TaskEvent::Started {
            task_id: task_id.clone(),
            running: slot.running,
        });

        let span = tracing::info_span!("task", id = %task_id);
        let result = self
            .executor
            .run_task(&task, &self.cancel)
            .instrument(span)
            .await;
        drop(slot);
        self.finish(result).await
    }

    async fn finish(&self, result: RunResult) -> RunResult {
        let status = if result.is_success() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        set_status(&self.statuses, &result.task_id, status).await;

        announce_finished(&self.events, &self.completed, self.total, &result);
        result
    }
}

fn announce_finished(
    events: &broadcast::Sender<TaskEvent>,
    completed: &AtomicUsize,
    total: usize,
    result: &RunResult,
) {
    let completed = completed.fetch_add(1, Ordering::SeqCst) + 1;
    let _ = events.send(TaskEvent::Finished {
        task_id: result.task_id.clone(),
        outcome: result.outcome,
        error: result.error_detail.clone(),
        completed,
        total,
    });
}

async fn set_status(
    statuses: &RwLock<HashMap<TaskId, TaskStatus>>,
    task_id: &TaskId,
    next: TaskStatus,
) {
    let mut statuses = statuses.write().await;
    let current = statuses.get(task_id).copied().unwrap_or(TaskStatus::Pending);
    match current.transition(next) {
        Ok(status) => {
            statuses.insert(task_id.clone(), status);
        }
        Err(e) => tracing::error!("Task {}: {}", task_id, e),
    }
}

#[derive(Debug, Default)]
struct RunningGauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl RunningGauge {
    fn enter(&self) -> RunningSlot<'_> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        RunningSlot {
            gauge: self,
            running,
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the running count when dropped, including on unwind.
struct RunningSlot<'a> {
    gauge: &'a RunningGauge,
    running: usize,
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.gauge.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_tracks_peak() {
        let gauge = RunningGauge::default();
        let a = gauge.enter();
        let b = gauge.enter();
        assert_eq!(b.running, 2);
        drop(a);
        let c = gauge.enter();
        assert_eq!(c.running, 2);
        drop(b);
        drop(c);

        assert_eq!(gauge.running.load(Ordering::SeqCst), 0);
        assert_eq!(gauge.peak(), 2);
    }

    #[tokio::test]
    async fn test_set_status_rejects_invalid_transition() {
        let statuses = RwLock::new(HashMap::new());
        let id = sweep_core::Task::baseline(1, 42).id();

        set_status(&statuses, &id, TaskStatus::Running).await;
        set_status(&statuses, &id, TaskStatus::Succeeded).await;
        set_status(&statuses, &id, TaskStatus::Running).await;

        assert_eq!(statuses.read().await.get(&id), Some(&TaskStatus::Succeeded));
    }
}
