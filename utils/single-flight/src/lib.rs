//! Cancelable single-flight memoization.
//!
//! A [`SingleFlight`] starts its computation on first request and hands every
//! concurrent or later requester a clone of the same shared future, so at most
//! one computation runs per cell. All cells created from the same
//! [`CancellationToken`] are torn down together: once the token fires, pending
//! waiters resolve to [`ComputeError::Cancelled`] at their next poll and no
//! computation is ever started again.
//!
//! Computations run on their own tokio task, so they keep making progress
//! when a waiter goes away, and a panic inside one surfaces as a
//! [`ComputeError::Fault`] instead of unwinding through every waiter.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of a memoized computation that did not produce a value.
#[derive(Debug, Error, Clone)]
pub enum ComputeError {
    #[error("computation cancelled")]
    Cancelled,
    #[error("computation failed: {0:#}")]
    Fault(Arc<anyhow::Error>),
}

impl ComputeError {
    pub fn fault(err: anyhow::Error) -> Self {
        Self::Fault(Arc::new(err))
    }
}

pub type ComputeResult<T> = Result<T, ComputeError>;

type SharedComputation<T> = Shared<BoxFuture<'static, ComputeResult<T>>>;

/// One memoized value, computed at most once while it keeps succeeding.
pub struct SingleFlight<T> {
    label: &'static str,
    cancel: CancellationToken,
    retry_failed: bool,
    slot: StdMutex<Option<SharedComputation<T>>>,
    started: AtomicUsize,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(label: &'static str, cancel: CancellationToken) -> Self {
        Self {
            label,
            cancel,
            retry_failed: true,
            slot: StdMutex::new(None),
            started: AtomicUsize::new(0),
        }
    }

    /// Whether a computation that failed with a fault is started again on the
    /// next request (the default) or its fault is returned from then on.
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    /// Returns the memoized value, starting `compute` if no computation is in
    /// flight or cached. `compute` is not called when an existing computation
    /// is reused.
    pub async fn get_or_compute<F, Fut>(&self, compute: F) -> ComputeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(ComputeError::Cancelled);
        }

        let computation = {
            let mut slot = lock(&self.slot);
            match slot.as_ref() {
                Some(existing) if !self.should_restart(existing) => existing.clone(),
                _ => {
                    let computation = self.start(compute());
                    *slot = Some(computation.clone());
                    computation
                }
            }
        };

        computation.await
    }

    /// Number of computations started over the life of this cell.
    pub fn computations_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn should_restart(&self, existing: &SharedComputation<T>) -> bool {
        self.retry_failed && matches!(existing.peek(), Some(Err(ComputeError::Fault(_))))
    }

    fn start<Fut>(&self, fut: Fut) -> SharedComputation<T>
    where
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let attempt = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(label = self.label, attempt, "starting memoized computation");
        let cancel = self.cancel.clone();
        let label = self.label;
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(label, "memoized computation cancelled");
                    Err(ComputeError::Cancelled)
                }
                result = fut => result.map_err(ComputeError::fault),
            }
        });
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(ComputeError::fault(anyhow::anyhow!(
                    "{label} computation task failed: {join_err}"
                ))),
            }
        }
        .boxed()
        .shared()
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("label", &self.label)
            .field("retry_failed", &self.retry_failed)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// A family of [`SingleFlight`] cells keyed by `K`, created on first request
/// and sharing one cancellation token.
pub struct SingleFlightMap<K, T> {
    label: &'static str,
    cancel: CancellationToken,
    retry_failed: bool,
    cells: StdMutex<HashMap<K, Arc<SingleFlight<T>>>>,
}

impl<K, T> SingleFlightMap<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(label: &'static str, cancel: CancellationToken) -> Self {
        Self {
            label,
            cancel,
            retry_failed: true,
            cells: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    pub async fn get_or_compute<F, Fut>(&self, key: &K, compute: F) -> ComputeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.cell(key).get_or_compute(compute).await
    }

    fn cell(&self, key: &K) -> Arc<SingleFlight<T>> {
        let mut cells = lock(&self.cells);
        if let Some(cell) = cells.get(key) {
            return Arc::clone(cell);
        }
        let cell = Arc::new(
            SingleFlight::new(self.label, self.cancel.clone())
                .with_retry_failed(self.retry_failed),
        );
        cells.insert(key.clone(), Arc::clone(&cell));
        cell
    }
}

impl<K, T> fmt::Debug for SingleFlightMap<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightMap")
            .field("label", &self.label)
            .field("retry_failed", &self.retry_failed)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
