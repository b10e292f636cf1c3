//! Bounded pool for independent store lookups
//!
//! The pre-pass issues one existence check per deleted record. Checks are
//! independent of each other, so they run concurrently with at most
//! `workers` in flight. [`LookupPool::run_all`] returns only once every check
//! has finished, so the pass that depends on the results never starts early.

use crate::domain::{Result, TributaryError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Fork/join pool with a fixed concurrency limit
#[derive(Debug, Clone)]
pub struct LookupPool {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl LookupPool {
    /// Creates a pool running at most `workers` lookups at once (at least one)
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `lookup` over every item and waits for all of them
    ///
    /// Results are returned in input order. Every lookup runs to completion
    /// even when one fails.
    ///
    /// # Errors
    ///
    /// Returns the error of the earliest failing item (by input position). If
    /// no lookup returned an error but a lookup task panicked, returns
    /// [`TributaryError::Other`] once the remaining tasks have finished.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, lookup: F) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let total = items.len();
        let lookup = Arc::new(lookup);
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = self.semaphore.clone();
            let lookup = lookup.clone();
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => lookup(item).await,
                    Err(e) => Err(TributaryError::Other(format!("lookup pool closed: {e}"))),
                };
                (index, outcome)
            });
        }

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut first_error: Option<(usize, TributaryError)> = None;
        let mut task_failure: Option<TributaryError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!(error = %e, "Lookup task failed");
                    if task_failure.is_none() {
                        task_failure = Some(TributaryError::Other(format!("lookup task failed: {e}")));
                    }
                    continue;
                }
            };
            match outcome {
                Ok(value) => results[index] = Some(value),
                Err(e) => {
                    if first_error.as_ref().map_or(true, |(first, _)| index < *first) {
                        first_error = Some((index, e));
                    }
                }
            }
        }

        if let Some((index, e)) = first_error {
            tracing::debug!(index, total, error = %e, "Lookup failed");
            return Err(e);
        }
        if let Some(e) = task_failure {
            return Err(e);
        }

        tracing::debug!(total, workers = self.workers, "Lookups complete");
        results
            .into_iter()
            .map(|r| r.ok_or_else(|| TributaryError::Other("lookup result missing".to_string())))
            .collect()
    }
}
