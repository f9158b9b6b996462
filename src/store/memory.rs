use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use super::{JobStore, Mutator, StoreError};
use crate::models::job::{Job, JobState, NewJob};

/// Process-local job store.
///
/// The map lock is held only to find or insert a record; reads and
/// compare-and-swap lock the individual record.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Arc<Mutex<Job>>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, job_id: Uuid) -> Result<Arc<Mutex<Job>>, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|p| p.into_inner());
        jobs.get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|p| p.into_inner());

        let job_id = match new_job.job_id {
            Some(id) if jobs.contains_key(&id) => return Err(StoreError::DuplicateJob(id)),
            Some(id) => id,
            None => loop {
                let id = Uuid::new_v4();
                if !jobs.contains_key(&id) {
                    break id;
                }
            },
        };

        let job = new_job.into_job(job_id);
        jobs.insert(job_id, Arc::new(Mutex::new(job.clone())));
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        let record = self.record(job_id)?;
        let job = record.lock().unwrap_or_else(|p| p.into_inner());
        Ok(job.clone())
    }

    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        expected_version: u64,
        mutator: Mutator,
    ) -> Result<Job, StoreError> {
        let record = self.record(job_id)?;
        let mut current = record.lock().unwrap_or_else(|p| p.into_inner());

        if current.version != expected_version {
            return Err(StoreError::Conflict {
                job_id,
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut next = current.clone();
        mutator(&mut next);
        next.job_id = current.job_id;
        next.version = expected_version + 1;
        *current = next.clone();
        Ok(next)
    }

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError> {
        let records: Vec<_> = {
            let jobs = self.jobs.read().unwrap_or_else(|p| p.into_inner());
            jobs.values().cloned().collect()
        };
        Ok(records
            .iter()
            .map(|r| r.lock().unwrap_or_else(|p| p.into_inner()).clone())
            .filter(|job| states.contains(&job.state))
            .collect())
    }
}
