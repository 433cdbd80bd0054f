// JSON-file job store
// Keeps jobs in memory and mirrors every change to disk

use super::{apply_update, sorted_by_creation, JobStore};
use crate::file_manager::{read_json_file_or_default, write_json_file, StoreError};
use crate::models::{Job, JobId, JobState};
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct JsonJobStore {
    path: PathBuf,
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JsonJobStore {
    /// Load existing jobs. Anything persisted mid-flight belonged to a
    /// process that is gone, so it is marked failed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let stored: Vec<Job> = read_json_file_or_default(path)?;

        let mut interrupted = 0;
        let jobs = stored
            .into_iter()
            .map(|mut job| {
                if mark_interrupted(&mut job) {
                    interrupted += 1;
                }
                (job.id.clone(), job)
            })
            .collect::<HashMap<_, _>>();

        info!("Loaded {} jobs from {:?} ({} interrupted)", jobs.len(), path, interrupted);

        let store = Self {
            path: path.to_path_buf(),
            jobs: RwLock::new(jobs),
        };
        if interrupted > 0 {
            store.persist(&store.jobs.read());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, jobs: &HashMap<JobId, Job>) {
        let snapshot = sorted_by_creation(jobs.values().cloned().collect());
        if let Err(e) = write_json_file(&self.path, &snapshot) {
            warn!("Failed to persist jobs to {:?}: {}", self.path, e);
        }
    }
}

// Submitted jobs still pass through Running on their way to Failed
fn mark_interrupted(job: &mut Job) -> bool {
    if job.state.is_terminal() {
        return false;
    }
    if job.state == JobState::Submitted && job.start().is_err() {
        return false;
    }
    job.fail("Interrupted before completion").is_ok()
}

impl JobStore for JsonJobStore {
    fn insert(&self, job: Job) {
        let mut jobs = self.jobs.write();
        jobs.insert(job.id.clone(), job);
        self.persist(&jobs);
    }

    fn update(&self, job: Job) -> bool {
        let mut jobs = self.jobs.write();
        let updated = apply_update(&mut jobs, job);
        if updated {
            self.persist(&jobs);
        }
        updated
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    fn list(&self) -> Vec<Job> {
        sorted_by_creation(self.jobs.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CombinedTable;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let mut job = Job::new(JobId::generate(), "calls.tsv".to_string(), 0);
        {
            let store = JsonJobStore::open(&path).unwrap();
            store.insert(job.clone());
            job.start().unwrap();
            job.complete(CombinedTable::new(vec!["pos".to_string()], vec![])).unwrap();
            assert!(store.update(job.clone()));
        }

        let reopened = JsonJobStore::open(&path).unwrap();
        let loaded = reopened.get(&job.id).unwrap();
        assert_eq!(loaded.state, JobState::Completed);
        assert_eq!(loaded.output, job.output);
        assert_eq!(reopened.list().len(), 1);
    }

    #[test]
    fn test_running_jobs_marked_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let mut job = Job::new(JobId::generate(), "calls.tsv".to_string(), 4);
        {
            let store = JsonJobStore::open(&path).unwrap();
            store.insert(job.clone());
            job.start().unwrap();
            store.update(job.clone());
        }

        let reopened = JsonJobStore::open(&path).unwrap();
        let loaded = reopened.get(&job.id).unwrap();
        assert_eq!(loaded.state, JobState::Failed);
        assert!(loaded.error.unwrap().contains("Interrupted"));

        // Persisted too
        let again = JsonJobStore::open(&path).unwrap();
        assert_eq!(again.get(&job.id).unwrap().state, JobState::Failed);
    }

    #[test]
    fn test_submitted_jobs_marked_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let job = Job::new(JobId::generate(), "calls.tsv".to_string(), 2);
        {
            let store = JsonJobStore::open(&path).unwrap();
            store.insert(job.clone());
        }

        let reopened = JsonJobStore::open(&path).unwrap();
        let loaded = reopened.get(&job.id).unwrap();
        assert_eq!(loaded.state, JobState::Failed);
        assert_eq!(loaded.error.as_deref(), Some("Interrupted before completion"));
        assert!(loaded.completed_at.is_some());
    }
}
