//! Job Store: keyed job records with compare-and-swap as the only mutation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::{Job, JobState, NewJob};

pub mod memory;
pub mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Edits a copy of the current record. The store bumps `version` afterwards.
pub type Mutator = Box<dyn FnOnce(&mut Job) + Send>;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a CREATED record at version 0.
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError>;

    /// Apply `mutator` only if the stored version equals `expected_version`.
    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        expected_version: u64,
        mutator: Mutator,
    ) -> Result<Job, StoreError>;

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} already exists")]
    DuplicateJob(Uuid),

    #[error("Version conflict on job {job_id}: expected {expected}, found {actual}")]
    Conflict {
        job_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}
