//! Job storage behind the orchestrator.
//!
//! The orchestrator only needs insert/update/get/list; where jobs live is up
//! to the implementation. Both stores here refuse to overwrite a job that has
//! already reached a terminal state.

pub mod json;
pub mod memory;

pub use json::JsonJobStore;
pub use memory::MemoryJobStore;

use crate::models::{Job, JobId};
use log::warn;
use std::collections::HashMap;

pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job);
    /// Replace a stored job. Returns false if the stored copy is terminal
    /// (or missing) and was left untouched.
    fn update(&self, job: Job) -> bool;
    fn get(&self, id: &JobId) -> Option<Job>;
    fn list(&self) -> Vec<Job>;
}

// Shared by both stores
fn apply_update(jobs: &mut HashMap<JobId, Job>, job: Job) -> bool {
    match jobs.get(&job.id) {
        Some(existing) if existing.state.is_terminal() => {
            warn!(
                "Refusing to modify job {} in terminal state {}",
                job.id, existing.state
            );
            false
        }
        Some(_) => {
            jobs.insert(job.id.clone(), job);
            true
        }
        None => {
            warn!("Update for unknown job {}", job.id);
            false
        }
    }
}

fn sorted_by_creation(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    jobs
}
