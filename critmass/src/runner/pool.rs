//! Fixed-size worker pool for independent batch jobs.
//!
//! Jobs run on a dedicated rayon pool and report `(index, result)` pairs
//! over a channel; the pool reassembles them in submission order. A job
//! that panics or is cancelled before it starts yields a [`WorkerError`]
//! for that job only.

use std::any::Any;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;

use crate::error::{SimError, WorkerError};

/// Outcome of one job.
pub type JobResult<T> = Result<T, WorkerError>;

// === CANCELLATION ===

/// Shared switch for abandoning jobs that have not started yet. Job ids are
/// submission indices within a batch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    all: Arc<AtomicBool>,
    jobs: Arc<Mutex<HashSet<usize>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, job: usize) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job);
    }

    pub fn cancel_all(&self) {
        self.all.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, job: usize) -> bool {
        self.all.load(Ordering::SeqCst)
            || self
                .jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&job)
    }

    /// Forget all cancellations, e.g. before reusing the handle for a new batch.
    pub fn reset(&self) {
        self.all.store(false, Ordering::SeqCst);
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// === POOL ===

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    cancel: CancelHandle,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

/// Available hardware parallelism, or 1 when it cannot be determined.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run every job and return their outcomes in submission order.
    ///
    /// Runs inline, in order, when the pool has one worker or there is at
    /// most one job.
    pub fn execute<T, F>(&self, jobs: Vec<F>) -> Vec<JobResult<T>>
    where
        T: Send,
        F: FnOnce() -> Result<T, SimError> + Send,
    {
        if self.workers <= 1 || jobs.len() <= 1 {
            return self.execute_sequential(jobs);
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "worker pool unavailable, running jobs sequentially");
                return self.execute_sequential(jobs);
            }
        };

        let count = jobs.len();
        let (tx, rx) = mpsc::channel::<(usize, JobResult<T>)>();
        pool.scope(|scope| {
            for (index, job) in jobs.into_iter().enumerate() {
                let tx = tx.clone();
                let cancel = &self.cancel;
                scope.spawn(move |_| {
                    // The receiver outlives the scope, so a send cannot fail.
                    let _ = tx.send((index, run_job(index, job, cancel)));
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<JobResult<T>>> = (0..count).map(|_| None).collect();
        for (index, result) in rx {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(job, slot)| slot.unwrap_or(Err(WorkerError::Lost { job })))
            .collect()
    }

    fn execute_sequential<T, F>(&self, jobs: Vec<F>) -> Vec<JobResult<T>>
    where
        F: FnOnce() -> Result<T, SimError>,
    {
        jobs.into_iter()
            .enumerate()
            .map(|(index, job)| run_job(index, job, &self.cancel))
            .collect()
    }
}

fn run_job<T, F>(index: usize, job: F, cancel: &CancelHandle) -> JobResult<T>
where
    F: FnOnce() -> Result<T, SimError>,
{
    if cancel.is_cancelled(index) {
        tracing::debug!(job = index, "job abandoned");
        return Err(WorkerError::Abandoned { job: index });
    }
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => {
            tracing::warn!(job = index, error = %source, "job failed");
            Err(WorkerError::Failed { job: index, source })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(job = index, %message, "job panicked");
            Err(WorkerError::Panicked { job: index, message })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use std::time::Duration;

    type Job = Box<dyn FnOnce() -> Result<usize, SimError> + Send>;

    fn job(f: impl FnOnce() -> Result<usize, SimError> + Send + 'static) -> Job {
        Box::new(f)
    }

    #[test]
    fn test_results_in_submission_order_despite_completion_order() {
        let pool = WorkerPool::new(4);
        let jobs: Vec<Job> = (0..8usize)
            .map(|i| {
                job(move || {
                    // Earlier jobs finish later.
                    thread::sleep(Duration::from_millis((8 - i as u64) * 5));
                    Ok(i * 10)
                })
            })
            .collect();
        let results = pool.execute(jobs);
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[test]
    fn test_panic_and_failure_are_isolated() {
        for workers in [1, 3] {
            let pool = WorkerPool::new(workers);
            let jobs: Vec<Job> = vec![
                job(|| Ok(1)),
                job(|| panic!("boom")),
                job(|| {
                    Err(SimError::Validation(ValidationError::NonPositive {
                        param: "n_agents",
                        value: "0".to_string(),
                    }))
                }),
                job(|| Ok(4)),
            ];
            let results = pool.execute(jobs);
            assert_eq!(results.len(), 4);
            assert_eq!(*results[0].as_ref().unwrap(), 1);
            match &results[1] {
                Err(WorkerError::Panicked { job, message }) => {
                    assert_eq!(*job, 1);
                    assert_eq!(message, "boom");
                }
                other => panic!("expected a panic report, got {other:?}"),
            }
            assert!(matches!(results[2], Err(WorkerError::Failed { job: 2, .. })));
            assert_eq!(*results[3].as_ref().unwrap(), 4);
        }
    }

    #[test]
    fn test_cancelled_jobs_are_abandoned() {
        let cancel = CancelHandle::new();
        cancel.cancel(1);
        let pool = WorkerPool::new(2).with_cancel_handle(cancel.clone());
        let jobs: Vec<Job> = (0..3usize).map(|i| job(move || Ok(i))).collect();
        let results = pool.execute(jobs);
        assert!(matches!(results[1], Err(WorkerError::Abandoned { job: 1 })));
        assert_eq!(*results[2].as_ref().unwrap(), 2);

        cancel.reset();
        cancel.cancel_all();
        let jobs: Vec<Job> = (0..2usize).map(|i| job(move || Ok(i))).collect();
        assert!(pool.execute(jobs).iter().all(|r| r.is_err()));
    }

    #[test]
    fn test_worker_count_is_at_least_one() {
        assert_eq!(WorkerPool::new(0).workers(), 1);
        assert!(default_workers() >= 1);
    }
}
