// Worker pool: semaphore-bounded fan-out with per-task failure isolation

use super::{CancelFlag, OutcomeCollector, Progress, SchedulerConfig};
use crate::models::{FailureCode, Outcome, Prediction};
use crate::predictor::{AbortSignal, PredictionError, Predictor};
use crate::splitter::Task;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// How long a timed-out call may take to wind down after its abort fires.
/// The task keeps its slot meanwhile.
const ABORT_GRACE: Duration = Duration::from_secs(2);

pub struct Scheduler {
    predictor: Arc<dyn Predictor>,
    config: SchedulerConfig,
    global_limit: Option<Arc<Semaphore>>,
}

impl Scheduler {
    pub fn new(predictor: Arc<dyn Predictor>, config: SchedulerConfig) -> Self {
        Self {
            predictor,
            config,
            global_limit: None,
        }
    }

    /// Share a process-wide cap on concurrent predictor calls
    pub fn with_global_limit(mut self, limit: Arc<Semaphore>) -> Self {
        self.global_limit = Some(limit);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute all tasks and return their outcomes in ascending row order.
    /// Completion order is arbitrary; the returned set is not.
    pub async fn run(&self, tasks: Vec<Task>, cancel: &CancelFlag, progress: &Arc<Progress>) -> Vec<Outcome> {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let collector = Arc::new(OutcomeCollector::with_capacity(total));

        info!(
            "Dispatching {} tasks (concurrency: {}, timeout: {:?})",
            total, self.config.concurrency, self.config.task_timeout
        );

        let mut handles = Vec::with_capacity(total);
        let mut pending = tasks.into_iter();

        while let Some(task) = pending.next() {
            let permit = if cancel.is_cancelled() {
                None
            } else {
                semaphore.clone().acquire_owned().await.ok()
            };

            // Re-check after waiting for a slot
            let permit = match permit {
                Some(permit) if !cancel.is_cancelled() => permit,
                _ => {
                    let skipped = std::iter::once(task).chain(pending.by_ref());
                    settle_undispatched(skipped, &collector, progress);
                    break;
                }
            };

            let row_index = task.row_index;
            let predictor = self.predictor.clone();
            let config = self.config.clone();
            let global_limit = self.global_limit.clone();
            let collector = collector.clone();
            let progress = progress.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit; // Hold permit until done

                let outcome = execute_task(task, predictor, &config, global_limit).await;
                progress.record(&outcome.result);
                collector.record(outcome).err()
            });

            handles.push((row_index, handle));
        }

        let mut rejected = Vec::new();
        for (row_index, handle) in handles {
            match handle.await {
                Ok(None) => {}
                Ok(Some(duplicate)) => {
                    error!("Duplicate outcome for row {}", duplicate.row_index);
                    rejected.push(duplicate);
                }
                Err(e) => {
                    if !collector.contains(row_index) {
                        let outcome = Outcome::failure(
                            row_index,
                            FailureCode::Panicked,
                            format!("Task panicked: {}", e),
                        );
                        progress.record(&outcome.result);
                        let _ = collector.record(outcome);
                    }
                }
            }
        }

        let mut outcomes = collector.take();
        // Left in so aggregation reports them as an invariant violation
        outcomes.extend(rejected);
        outcomes
    }
}

fn settle_undispatched(
    tasks: impl Iterator<Item = Task>,
    collector: &OutcomeCollector,
    progress: &Progress,
) {
    let mut count = 0;
    for task in tasks {
        let outcome = Outcome::failure(
            task.row_index,
            FailureCode::Cancelled,
            "Job cancelled before task was dispatched",
        );
        progress.record(&outcome.result);
        let _ = collector.record(outcome);
        count += 1;
    }
    info!("Cancelled {} undispatched tasks", count);
}

/// Run one task to a single outcome. Predictor errors, timeouts and panics
/// are all converted here and never propagate. Only transient predictor
/// errors are retried; a timeout is final for the row.
async fn execute_task(
    task: Task,
    predictor: Arc<dyn Predictor>,
    config: &SchedulerConfig,
    global_limit: Option<Arc<Semaphore>>,
) -> Outcome {
    let row_index = task.row_index;

    if let Err(reason) = task.precheck() {
        debug!("Row {} failed precheck: {}", row_index, reason);
        return Outcome::failure(row_index, FailureCode::PredictionFailure, reason);
    }

    let attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let global_permit = match &global_limit {
            Some(limit) => limit.clone().acquire_owned().await.ok(),
            None => None,
        };
        let predictor = predictor.clone();
        let request = task.request.clone();
        let abort = Arc::new(AbortSignal::new());

        // The global permit is released when the call really returns
        let mut call = {
            let abort = abort.clone();
            tokio::task::spawn_blocking(move || {
                let _global_permit = global_permit;
                predictor.predict_abortable(&request, &abort)
            })
        };

        let joined = match config.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut call).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    settle_abandoned(row_index, call).await;
                    return Outcome::failure(
                        row_index,
                        FailureCode::Timeout,
                        format!("Predictor exceeded {:?}", limit),
                    );
                }
            },
            None => call.await,
        };

        match joined {
            Ok(Ok(prediction)) => return Outcome::success(row_index, prediction),
            Ok(Err(e)) if e.is_transient() && attempt < attempts => {
                debug!("Row {} attempt {}/{} failed: {}, retrying", row_index, attempt, attempts, e);
            }
            Ok(Err(e)) => {
                debug!("Row {} prediction failed: {}", row_index, e);
                return Outcome::failure(row_index, FailureCode::PredictionFailure, e.to_string());
            }
            Err(e) => {
                return Outcome::failure(
                    row_index,
                    FailureCode::Panicked,
                    format!("Predictor panicked: {}", e),
                );
            }
        }
    }
}

// Give an aborted call a moment to exit so it stays inside the concurrency
// bound. A predictor that ignores the abort is detached.
async fn settle_abandoned(row_index: usize, call: JoinHandle<Result<Prediction, PredictionError>>) {
    match tokio::time::timeout(ABORT_GRACE, call).await {
        Ok(_) => debug!("Row {} predictor call wound down after timeout", row_index),
        Err(_) => warn!(
            "Row {} predictor ignored abort for {:?}; detaching it",
            row_index, ABORT_GRACE
        ),
    }
}
