use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, error};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::session::SessionReport;
use crate::worker::job::{Job, JobOutcome};

/// Bounded set of running scrape sessions.
///
/// Each session holds one semaphore permit for its whole life, so at most
/// `capacity` sessions (and fetchers) exist at once. A panicking session is
/// turned into a `Failed` report for its own job.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    tasks: JoinSet<SessionReport>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: JoinSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions spawned and not yet collected.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.permits.available_permits() > 0 && self.tasks.len() < self.capacity
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Starts `run(job)` if a slot is free, otherwise hands the job back.
    pub fn try_spawn<F, Fut>(&mut self, job: Job, run: F) -> Result<(), Job>
    where
        F: FnOnce(Job) -> Fut,
        Fut: Future<Output = SessionReport> + Send + 'static,
    {
        if self.tasks.len() >= self.capacity {
            return Err(job);
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(job),
        };

        let fallback = job.clone();
        let session = run(job);
        debug!("Dispatching job {} ({} active)", fallback.id, self.tasks.len() + 1);

        self.tasks.spawn(async move {
            let _permit = permit;
            match AssertUnwindSafe(session).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Scrape session for job {} panicked: {}", fallback.id, message);
                    SessionReport {
                        job: fallback,
                        outcome: JobOutcome::Failed {
                            error: format!("Scrape session panicked: {}", message),
                            partial_path: None,
                        },
                    }
                }
            }
        });
        Ok(())
    }

    /// Waits for the next session to finish. `None` once the pool is empty.
    pub async fn next_result(&mut self) -> Option<SessionReport> {
        loop {
            match self.tasks.join_next().await? {
                Ok(report) => return Some(report),
                Err(e) => error!("Scrape session task did not complete: {}", e),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
