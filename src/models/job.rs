// Job data models
use crate::error::JobError;
use crate::models::CombinedTable;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// Submitted -> Running -> {Completed | Failed | Cancelled}
    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Submitted, JobState::Running) => true,
            (JobState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input_ref: String,
    pub state: JobState,
    pub rows_total: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    pub output: Option<CombinedTable>,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl Job {
    pub fn new(id: JobId, input_ref: String, rows_total: usize) -> Self {
        Self {
            id,
            input_ref,
            state: JobState::Submitted,
            rows_total,
            rows_succeeded: 0,
            rows_failed: 0,
            output: None,
            error: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    fn transition(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InternalInvariantViolation(format!(
                "job {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }

        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(chrono::Utc::now().to_rfc3339());
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Running)
    }

    /// Store the combined table. Partial row failures still complete the job
    /// but leave an error summary behind.
    pub fn complete(&mut self, output: CombinedTable) -> Result<(), JobError> {
        self.transition(JobState::Completed)?;

        self.rows_succeeded = output.succeeded();
        self.rows_failed = output.failed();
        if self.rows_failed > 0 {
            self.error = Some(format!(
                "{} of {} rows failed prediction",
                self.rows_failed, self.rows_total
            ));
        }
        self.output = Some(output);
        Ok(())
    }

    /// A failed job delivers no table, so every row counts as failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobState::Failed)?;
        self.rows_succeeded = 0;
        self.rows_failed = self.rows_total;
        self.error = Some(reason.into());
        Ok(())
    }

    pub fn cancel(&mut self, succeeded: usize, failed: usize) -> Result<(), JobError> {
        self.transition(JobState::Cancelled)?;
        self.rows_succeeded = succeeded;
        self.rows_failed = failed;
        self.error = Some("Job cancelled".to_string());
        Ok(())
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id.clone(),
            state: self.state,
            rows_total: self.rows_total,
            rows_succeeded: self.rows_succeeded,
            rows_failed: self.rows_failed,
            error: self.error.clone(),
            created_at: self.created_at.clone(),
            completed_at: self.completed_at.clone(),
        }
    }
}

/// Snapshot returned by status queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    pub rows_total: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}
