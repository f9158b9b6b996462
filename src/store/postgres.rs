use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobStore, Mutator, StoreError};
use crate::db::queries;
use crate::models::job::{Job, JobState, NewJob};

/// PostgreSQL-backed job store. Compare-and-swap is a conditional `UPDATE`
/// on the `version` column.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let explicit = new_job.job_id;
        let job = new_job.into_job(explicit.unwrap_or_else(Uuid::new_v4));
        queries::insert_job(&self.pool, &job)
            .await?
            .ok_or(StoreError::DuplicateJob(job.job_id))
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        queries::get_job(&self.pool, job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        expected_version: u64,
        mutator: Mutator,
    ) -> Result<Job, StoreError> {
        let current = self.get(job_id).await?;
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

        if queries::update_job_versioned(&self.pool, &next, expected_version).await? {
            Ok(next)
        } else {
            let actual = self.get(job_id).await?.version;
            Err(StoreError::Conflict {
                job_id,
                expected: expected_version,
                actual,
            })
        }
    }

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError> {
        queries::list_jobs_by_state(&self.pool, states).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
