// In-process job store
use super::{apply_update, sorted_by_creation, JobStore};
use crate::models::{Job, JobId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) {
        self.jobs.write().insert(job.id.clone(), job);
    }

    fn update(&self, job: Job) -> bool {
        apply_update(&mut self.jobs.write(), job)
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    fn list(&self) -> Vec<Job> {
        sorted_by_creation(self.jobs.read().values().cloned().collect())
    }
}
