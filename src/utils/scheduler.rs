//! Bounded dispatch of assembly tasks.
//!
//! At most `workers` tasks run at once and at most `2 * workers` are
//! outstanding (queued, running, or finished but not yet handed to the
//! completion handler). `submit` waits for a free slot and, while waiting,
//! delivers finished tasks to the handler on the calling task, so callbacks
//! never run concurrently with each other.
//!
//! The first failed task stops everything: the handler is told, every other
//! task is aborted (their child processes are killed on drop) and the failure
//! is returned to the caller.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error, info};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::config::defs::{PipelineError, SLOTS_PER_WORKER};
use crate::utils::command::TaskRunner;
use crate::utils::shard::TaskInvocation;


/// Receives each finished task exactly once.
pub trait CompletionHandler: Send + Sync + 'static {
    fn on_success(&self, invocation: &TaskInvocation) -> impl Future<Output = ()> + Send;

    fn on_failure(&self, invocation: &TaskInvocation, error: &PipelineError);
}


#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub peak_outstanding: usize,
}

struct TaskCompletion {
    invocation: TaskInvocation,
    result: Result<(), PipelineError>,
    slot: OwnedSemaphorePermit,
}

/// A task that has finished but not yet been handed to the completion handler.
pub struct FinishedTask(Result<TaskCompletion, JoinError>);


pub struct TaskScheduler<R, H> {
    runner: Arc<R>,
    handler: Arc<H>,
    slots: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    capacity: usize,
    tasks: JoinSet<TaskCompletion>,
    stats: SchedulerStats,
}

impl<R, H> TaskScheduler<R, H>
where
    R: TaskRunner,
    H: CompletionHandler,
{
    pub fn new(workers: usize, runner: Arc<R>, handler: Arc<H>) -> Result<Self, PipelineError> {
        if workers == 0 {
            return Err(PipelineError::InvalidConfig("worker count must be at least 1".to_string()));
        }
        let capacity = workers * SLOTS_PER_WORKER;
        debug!("Task scheduler: {} workers, {} task slots", workers, capacity);
        Ok(TaskScheduler {
            runner,
            handler,
            slots: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(workers)),
            capacity,
            tasks: JoinSet::new(),
            stats: SchedulerStats::default(),
        })
    }

    /// Maximum number of outstanding tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// True while any task is queued, running, or waiting to be settled.
    pub fn has_outstanding(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Waits for the next task to finish, None when nothing is outstanding.
    ///
    /// Cancel safe, so callers can race it against other work and pass the
    /// result to `settle` when it wins.
    pub async fn wait_finished(&mut self) -> Option<FinishedTask> {
        self.tasks.join_next().await.map(FinishedTask)
    }

    /// Runs the completion handler for a finished task. A failure aborts every
    /// other task before it is returned.
    pub async fn settle(&mut self, finished: FinishedTask) -> Result<(), PipelineError> {
        self.complete(finished.0).await
    }

    /// Hands a shard to the worker pool, waiting while all slots are taken.
    ///
    /// # Returns
    /// Err with the first task failure seen while waiting; the scheduler has
    /// already aborted everything else by then.
    pub async fn submit(&mut self, invocation: TaskInvocation) -> Result<(), PipelineError> {
        let slot = loop {
            tokio::select! {
                biased;
                Some(done) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.complete(done).await?;
                }
                permit = self.slots.clone().acquire_owned() => {
                    break permit.map_err(|e| PipelineError::Join(e.to_string()))?;
                }
            }
        };

        let outstanding = self.outstanding();
        self.stats.peak_outstanding = self.stats.peak_outstanding.max(outstanding);
        self.stats.submitted += 1;
        debug!("Submitted {} ({} of {} slots in use)", invocation.shard_id, outstanding, self.capacity);

        let runner = self.runner.clone();
        let workers = self.workers.clone();
        self.tasks.spawn(async move {
            let result = match workers.acquire_owned().await {
                Ok(_worker) => {
                    match AssertUnwindSafe(runner.run(&invocation)).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(PipelineError::Join(format!("worker for {} panicked", invocation.shard_id))),
                    }
                }
                Err(e) => Err(PipelineError::Join(e.to_string())),
            };
            TaskCompletion { invocation, result, slot }
        });
        Ok(())
    }

    /// Closes the scheduler and waits for every outstanding task.
    pub async fn finish(mut self) -> Result<SchedulerStats, PipelineError> {
        info!("All shards submitted; waiting for {} outstanding tasks", self.tasks.len());
        while let Some(done) = self.tasks.join_next().await {
            self.complete(done).await?;
        }
        Ok(self.stats)
    }

    /// Kills every outstanding task without running callbacks.
    pub async fn abort(mut self) -> SchedulerStats {
        self.terminate().await;
        self.stats
    }

    async fn complete(&mut self, done: Result<TaskCompletion, JoinError>) -> Result<(), PipelineError> {
        let TaskCompletion { invocation, result, slot } = match done {
            Ok(completion) => completion,
            Err(e) => {
                let err = PipelineError::Join(e.to_string());
                error!("{}", err);
                self.stats.failed += 1;
                self.terminate().await;
                return Err(err);
            }
        };
        match result {
            Ok(()) => {
                self.handler.on_success(&invocation).await;
                self.stats.succeeded += 1;
                drop(slot);
                Ok(())
            }
            Err(err) => {
                self.handler.on_failure(&invocation, &err);
                self.stats.failed += 1;
                drop(slot);
                self.terminate().await;
                Err(err)
            }
        }
    }

    async fn terminate(&mut self) {
        let remaining = self.tasks.len();
        if remaining > 0 {
            error!("Terminating {} outstanding assembly tasks", remaining);
        }
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}
