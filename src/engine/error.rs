use uuid::Uuid;

use crate::models::job::JobState;
use crate::store::StoreError;

/// Errors from lifecycle operations. All are scoped to a single job.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Cannot {operation} job {job_id} in state {state}")]
    InvalidState {
        job_id: Uuid,
        state: JobState,
        operation: &'static str,
    },

    #[error("Job {job_id} kept changing underneath {attempts} update attempts")]
    Conflict { job_id: Uuid, attempts: u32 },

    #[error("Job {job_id} is {state} and received a callback with different content")]
    InconsistentCallback { job_id: Uuid, state: JobState },

    #[error("Token issuance failed: {0}")]
    TokenIssuance(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Status poll for job {job_id} timed out")]
    PollTimeout { job_id: Uuid },

    #[error("Status poll failed: {0}")]
    PollFailed(String),

    #[error("Job {0} already exists")]
    DuplicateJob(Uuid),

    #[error("Job store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::DuplicateJob(id) => EngineError::DuplicateJob(id),
            StoreError::Conflict { job_id, .. } => EngineError::Conflict {
                job_id,
                attempts: 1,
            },
            other => EngineError::Store(other),
        }
    }
}
