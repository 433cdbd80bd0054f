//! Bounded worker pool executing one job's tasks.
//!
//! Every task yields exactly one [`Outcome`](crate::models::Outcome), whether
//! the predictor succeeds, errors, times out, panics, or the job is cancelled
//! before the task is dispatched.

pub mod collector;
pub mod pool;

pub use collector::OutcomeCollector;
pub use pool::Scheduler;

use crate::models::{RowResult, Settings};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum tasks in flight for one job (at least 1)
    pub concurrency: usize,
    pub task_timeout: Option<Duration>,
    /// Extra attempts for transient predictor errors and timeouts
    pub max_retries: u32,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.max_concurrent_tasks.max(1),
            task_timeout: settings.task_timeout(),
            max_retries: settings.max_retries,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Cooperative cancellation: stops new dispatches, never interrupts a
/// predictor call already running.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Live success/failure counters for status queries while a job runs
#[derive(Debug, Default)]
pub struct Progress {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &RowResult) {
        if result.is_success() {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// (succeeded, failed)
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.succeeded.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }
}
