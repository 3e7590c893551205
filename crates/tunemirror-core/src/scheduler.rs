//! Bounded-concurrency work scheduler.
//!
//! Runs a caller-supplied async operation over a list of items with a fixed
//! ceiling on in-flight invocations. The first failure, or a cancellation
//! request, stops intake: no further item is started, but every item already
//! started runs to completion before [`Scheduler::run`] returns.
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new(4).with_cancellation(token.clone());
//! let summary = scheduler
//!     .run(items, |item| async move { sync_one(item).await })
//!     .await?;
//! if summary.cancelled {
//!     info!("Stopped after {} of {} items", summary.completed, summary.total);
//! }
//! ```

use crate::cancel::CancellationToken;
use crate::config::default_concurrency;
use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

/// Progress update sent after every completed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkProgress {
    /// Items finished so far, successfully or not.
    pub completed: usize,
    /// Items submitted to the run.
    pub total: usize,
}

/// Outcome of a run that recorded no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub started: usize,
    pub completed: usize,
    /// Cancellation was requested during (or before) the run.
    pub cancelled: bool,
}

impl RunSummary {
    /// Every submitted item ran.
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Shared result collector guarded by a single lock.
struct Collector<E> {
    first_error: Option<E>,
    completed: usize,
}

/// Executes work items with at most `concurrency` in flight.
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
    cancel: CancellationToken,
    progress_tx: Option<mpsc::Sender<WorkProgress>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

impl Scheduler {
    /// Create a scheduler. A ceiling of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
            progress_tx: None,
        }
    }

    /// Observe `token` before each dispatch.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Send a [`WorkProgress`] after each item. Full channels drop updates.
    pub fn with_progress(mut self, tx: mpsc::Sender<WorkProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `op` over every item.
    ///
    /// Returns the first recorded error, or a summary. Items complete in no
    /// particular order.
    pub async fn run<T, E, F, Fut>(&self, items: Vec<T>, op: F) -> Result<RunSummary, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let total = items.len();
        let op = Arc::new(op);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let collector = Arc::new(Mutex::new(Collector::<E> {
            first_error: None,
            completed: 0,
        }));
        let mut tasks = JoinSet::new();
        let mut started = 0usize;
        let mut panic = None;

        for item in items {
            if panic.is_some() || self.should_stop(&collector) {
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            // A failure or cancellation may have landed while waiting for a slot.
            if self.should_stop(&collector) {
                break;
            }

            started += 1;
            let op = Arc::clone(&op);
            let collector = Arc::clone(&collector);
            let progress_tx = self.progress_tx.clone();
            tasks.spawn(async move {
                let result = op(item).await;
                let completed = {
                    let mut state = collector.lock().expect("scheduler lock poisoned");
                    state.completed += 1;
                    if let Err(err) = result {
                        if state.first_error.is_none() {
                            state.first_error = Some(err);
                        }
                    }
                    state.completed
                };
                // Released only after the result is recorded, so the intake
                // loop sees a failure before it can start another item.
                drop(permit);
                if let Some(tx) = progress_tx {
                    let _ = tx.try_send(WorkProgress { completed, total });
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                Self::record_panic(joined, &mut panic);
            }
        }

        if started < total {
            debug!("Scheduler intake stopped after {} of {} items", started, total);
        }

        // In-flight items run to completion before a panic is re-raised.
        while let Some(joined) = tasks.join_next().await {
            Self::record_panic(joined, &mut panic);
        }
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }

        let mut state = collector.lock().expect("scheduler lock poisoned");
        if let Some(err) = state.first_error.take() {
            return Err(err);
        }

        Ok(RunSummary {
            total,
            started,
            completed: state.completed,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    fn should_stop<E>(&self, collector: &Mutex<Collector<E>>) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        collector
            .lock()
            .expect("scheduler lock poisoned")
            .first_error
            .is_some()
    }

    /// Keep the first panic payload; later ones are dropped.
    fn record_panic(
        joined: std::result::Result<(), JoinError>,
        panic: &mut Option<Box<dyn Any + Send + 'static>>,
    ) {
        if let Err(err) = joined {
            if err.is_panic() && panic.is_none() {
                *panic = Some(err.into_panic());
            }
        }
    }
}
