// Job-level error taxonomy surfaced to submitters

use crate::models::{JobId, JobState};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// Structural defect in the submitted table. No job is created.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The job has no combined table (still running, failed or cancelled).
    #[error("Job {job_id} is not ready (state: {state})")]
    NotReady { job_id: JobId, state: JobState },

    /// Outcome set does not match the submitted rows, or a lifecycle
    /// transition was attempted out of order.
    #[error("Internal invariant violation: {0}")]
    InternalInvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
