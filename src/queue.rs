//! Job queue and dispatch loop
//!
//! `enqueue` is cheap and never rejects. A single [`Dispatcher`] drains the
//! queue in FIFO order under rate-limit admission, launching each job on its
//! own task so a slow generation never holds up the next dispatch.

use crate::job::Job;
use crate::rate_limiter::{Admission, RateLimiter};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Shortest sleep between admission retries when the epoch is full
const MIN_ADMISSION_RETRY: Duration = Duration::from_millis(100);

/// Pause after a fault inside the dispatch loop
const FAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Dispatch loop fault: {0}")]
    LoopFault(String),
}

impl QueueError {
    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        QueueError::LoopFault(panic_message(payload))
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// FIFO buffer of jobs waiting for dispatch
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<Job>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, job: Job) {
        let depth = {
            let mut pending = self.lock();
            tracing::debug!(job_id = %job.id(), user_id = job.user_id(), "Job enqueued");
            pending.push_back(job);
            pending.len()
        };
        tracing::debug!(depth, "Queue depth");
        self.notify.notify_one();
    }

    pub fn dequeue(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves once something has been enqueued since the last wakeup
    async fn wait_for_work(&self) {
        self.notify.notified().await;
    }
}

/// Runs one dispatched job to completion
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: Job);
}

#[async_trait]
impl<T: JobExecutor + ?Sized> JobExecutor for Arc<T> {
    async fn execute(&self, job: Job) {
        (**self).execute(job).await;
    }
}

enum LoopControl {
    Continue,
    Stop,
}

/// Single consumer of the job queue
pub struct Dispatcher<E> {
    queue: Arc<JobQueue>,
    limiter: Arc<RateLimiter>,
    executor: Arc<E>,
    executions: TaskTracker,
}

impl<E: JobExecutor + 'static> Dispatcher<E> {
    pub fn new(queue: Arc<JobQueue>, limiter: Arc<RateLimiter>, executor: Arc<E>) -> Self {
        Self {
            queue,
            limiter,
            executor,
            executions: TaskTracker::new(),
        }
    }

    /// Handle on launched executions. It is closed when `run` returns, so
    /// `wait()` resolves once the last launched job has finished.
    pub fn executions(&self) -> TaskTracker {
        self.executions.clone()
    }

    /// Dispatch until cancelled. Jobs still queued at cancellation are
    /// dropped; jobs already launched keep running.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            limit_per_minute = self.limiter.limit_per_minute(),
            "Dispatch loop started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            match AssertUnwindSafe(self.step(&cancel)).catch_unwind().await {
                Ok(LoopControl::Continue) => {}
                Ok(LoopControl::Stop) => break,
                Err(payload) => {
                    let error = QueueError::from_panic(payload.as_ref());
                    tracing::error!(error = %error, "Dispatch loop fault, backing off");
                    if !sleep_or_cancel(FAULT_BACKOFF, &cancel).await {
                        break;
                    }
                }
            }
        }

        self.executions.close();
        let dropped = self.queue.len();
        tracing::info!(
            dropped,
            in_flight = self.executions.len(),
            "Dispatch loop stopped"
        );
    }

    async fn step(&self, cancel: &CancellationToken) -> LoopControl {
        // Idle queue: park instead of spending admissions on nothing
        if self.queue.is_empty() {
            tokio::select! {
                () = cancel.cancelled() => return LoopControl::Stop,
                () = self.queue.wait_for_work() => return LoopControl::Continue,
            }
        }

        match self.limiter.try_admit() {
            Admission::WaitFor(wait) => {
                let wait = wait.max(MIN_ADMISSION_RETRY);
                tracing::debug!(wait = ?wait, "Rate limited, waiting");
                if !sleep_or_cancel(wait, cancel).await {
                    return LoopControl::Stop;
                }
                LoopControl::Continue
            }
            Admission::Admit => {
                if let Some(job) = self.queue.dequeue() {
                    tracing::debug!(
                        job_id = %job.id(),
                        user_id = job.user_id(),
                        kind = %job.kind(),
                        "Dispatching job"
                    );
                    let executor = Arc::clone(&self.executor);
                    self.executions.spawn(async move {
                        executor.execute(job).await;
                    });
                }
                if !sleep_or_cancel(self.limiter.pacing_delay(), cancel).await {
                    return LoopControl::Stop;
                }
                LoopControl::Continue
            }
        }
    }
}

/// Returns false if cancelled before the sleep finished
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
