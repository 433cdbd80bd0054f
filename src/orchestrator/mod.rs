//! Job orchestration.
//!
//! [`Orchestrator::submit`] validates and splits the table synchronously, then
//! drives scheduler and aggregator for the job on a background Tokio task.
//! Status and result queries read from the [`JobStore`]; once a job is
//! terminal its stored snapshot never changes.

use crate::aggregator::aggregate;
use crate::error::{JobError, Result};
use crate::models::{
    CombinedTable, FailureCode, InputTable, Job, JobId, JobState, JobStatus, Outcome, RowRecord,
    RowResult, Settings,
};
use crate::predictor::Predictor;
use crate::scheduler::{CancelFlag, Progress, Scheduler, SchedulerConfig};
use crate::splitter::{build_tasks, split, TaskParams};
use crate::store::{JobStore, MemoryJobStore};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinError;

/// Handles for a job whose fan-out is still in flight
struct ActiveJob {
    cancel: CancelFlag,
    progress: Arc<Progress>,
    state: watch::Receiver<JobState>,
}

struct Shared {
    store: Arc<dyn JobStore>,
    scheduler: Scheduler,
    params: TaskParams,
    active: Mutex<HashMap<JobId, ActiveJob>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(predictor: Arc<dyn Predictor>, settings: &Settings) -> Self {
        Self::with_store(predictor, settings, Arc::new(MemoryJobStore::new()))
    }

    pub fn with_store(predictor: Arc<dyn Predictor>, settings: &Settings, store: Arc<dyn JobStore>) -> Self {
        let mut scheduler = Scheduler::new(predictor, SchedulerConfig::from_settings(settings));
        if let Some(limit) = settings.global_predictor_limit {
            scheduler = scheduler.with_global_limit(Arc::new(Semaphore::new(limit.max(1))));
        }

        Self {
            shared: Arc::new(Shared {
                store,
                scheduler,
                params: TaskParams::from_settings(settings),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Validate the table, create the job and start its fan-out in the
    /// background. Must be called from within a Tokio runtime.
    pub fn submit(&self, table: InputTable) -> Result<JobId> {
        // Structural defects fail here, before any job exists
        let rows = split(&table)?;

        let job_id = JobId::generate();
        let mut job = Job::new(job_id.clone(), table.source.clone(), rows.len());
        self.shared.store.insert(job.clone());

        let cancel = CancelFlag::new();
        let progress = Arc::new(Progress::new());
        let (state_tx, state_rx) = watch::channel(JobState::Submitted);

        self.shared.active.lock().insert(
            job_id.clone(),
            ActiveJob {
                cancel: cancel.clone(),
                progress: progress.clone(),
                state: state_rx,
            },
        );

        job.start()?;
        self.shared.store.update(job.clone());
        let _ = state_tx.send(JobState::Running);

        info!(
            "Submitted job {} from {} ({} rows)",
            job_id, table.source, rows.len()
        );

        let shared = self.shared.clone();
        let running = job.clone();
        tokio::spawn(async move {
            let run = tokio::spawn(run_job(shared.clone(), job, table.columns, rows, cancel, progress));
            let state = match run.await {
                Ok(state) => state,
                Err(e) => recover_crashed(&shared, running.clone(), e),
            };
            shared.active.lock().remove(&running.id);
            let _ = state_tx.send(state);
        });

        Ok(job_id)
    }

    pub fn status(&self, job_id: &JobId) -> Result<JobStatus> {
        let job = self
            .shared
            .store
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.clone()))?;

        let mut status = job.status();
        if !status.state.is_terminal() {
            if let Some(active) = self.shared.active.lock().get(job_id) {
                let (succeeded, failed) = active.progress.snapshot();
                status.rows_succeeded = succeeded;
                status.rows_failed = failed;
            }
        }
        Ok(status)
    }

    pub fn result(&self, job_id: &JobId) -> Result<CombinedTable> {
        let job = self
            .shared
            .store
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.clone()))?;

        match (job.state, job.output) {
            (JobState::Completed, Some(table)) => Ok(table),
            (JobState::Completed, None) => Err(JobError::InternalInvariantViolation(format!(
                "job {} completed without a combined table",
                job_id
            ))),
            (state, _) => Err(JobError::NotReady {
                job_id: job_id.clone(),
                state,
            }),
        }
    }

    /// Stop dispatching new tasks for a running job. Tasks already running
    /// finish (or time out). Returns false if the job had already finished.
    pub fn cancel(&self, job_id: &JobId) -> Result<bool> {
        if let Some(active) = self.shared.active.lock().get(job_id) {
            active.cancel.cancel();
            info!("Cancellation requested for job {}", job_id);
            return Ok(true);
        }

        match self.shared.store.get(job_id) {
            Some(_) => Ok(false),
            None => Err(JobError::NotFound(job_id.clone())),
        }
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait(&self, job_id: &JobId) -> Result<JobStatus> {
        let receiver = self
            .shared
            .active
            .lock()
            .get(job_id)
            .map(|active| active.state.clone());

        if let Some(mut receiver) = receiver {
            // Sender dropping early means the job task is gone; the store
            // below has the final word either way
            if receiver.wait_for(|state| state.is_terminal()).await.is_err() {
                debug!("State channel for job {} closed", job_id);
            }
        }

        let status = self.status(job_id)?;
        if !status.state.is_terminal() {
            return Err(JobError::InternalInvariantViolation(format!(
                "job {} stopped in state {}",
                job_id, status.state
            )));
        }
        Ok(status)
    }

    pub fn list(&self) -> Vec<JobStatus> {
        self.shared
            .store
            .list()
            .iter()
            .map(|job| job.status())
            .collect()
    }
}

async fn run_job(
    shared: Arc<Shared>,
    mut job: Job,
    columns: Vec<String>,
    rows: Vec<RowRecord>,
    cancel: CancelFlag,
    progress: Arc<Progress>,
) -> JobState {
    let job_id = job.id.clone();

    if rows.is_empty() {
        warn!("Job {} has no rows to schedule", job_id);
        finish(&shared, &mut job, |job| job.fail("No rows to schedule"));
        return job.state;
    }

    let tasks = build_tasks(&rows, &shared.params);
    let outcomes = shared.scheduler.run(tasks, &cancel, &progress).await;

    // A cancel that lands once every task is dispatched skips nothing, so
    // the job still completes
    if skipped_count(&outcomes) > 0 {
        let succeeded = outcomes.iter().filter(|o| o.result.is_success()).count();
        let failed = outcomes.len() - succeeded;
        info!(
            "Job {} cancelled ({} succeeded, {} failed or skipped)",
            job_id, succeeded, failed
        );
        finish(&shared, &mut job, |job| job.cancel(succeeded, failed));
        return job.state;
    }
    if cancel.is_cancelled() {
        info!("Job {} cancelled after its last dispatch; completing", job_id);
    }

    match aggregate(&columns, &rows, outcomes) {
        Ok(table) => {
            finish(&shared, &mut job, |job| job.complete(table));
            info!(
                "Job {} completed: {} succeeded, {} failed",
                job_id, job.rows_succeeded, job.rows_failed
            );
        }
        Err(e) => {
            error!("Job {} aborted: {}", job_id, e);
            finish(&shared, &mut job, |job| job.fail(e.to_string()));
        }
    }
    job.state
}

fn skipped_count(outcomes: &[Outcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(&o.result, RowResult::Failed(d) if d.code == FailureCode::Cancelled))
        .count()
}

// The job task panicked. Whatever it stored last wins if terminal,
// otherwise the job is failed here.
fn recover_crashed(shared: &Shared, mut job: Job, err: JoinError) -> JobState {
    if let Some(stored) = shared.store.get(&job.id) {
        if stored.state.is_terminal() {
            return stored.state;
        }
    }

    let reason = JobError::InternalInvariantViolation(format!("job task panicked: {}", err));
    error!("Job {} aborted: {}", job.id, reason);
    finish(shared, &mut job, |job| job.fail(reason.to_string()));
    job.state
}

// Apply a terminal transition and persist it
fn finish<F>(shared: &Shared, job: &mut Job, transition: F)
where
    F: FnOnce(&mut Job) -> Result<()>,
{
    if let Err(e) = transition(job) {
        error!("{}", e);
        return;
    }
    if !shared.store.update(job.clone()) {
        error!("Job {} could not be stored in state {}", job.id, job.state);
    }
}
