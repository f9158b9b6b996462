use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::JobState;
use crate::models::verification::JobStatusResponse;
use crate::routes::error::ApiError;

/// GET /status/{user_id}/{job_id} — current job state with lazy expiry.
///
/// Ownership is checked before expiry so other users cannot move the job.
/// A job still SUBMITTED gets a reconciliation poller if none is running.
pub async fn job_status(
    State(state): State<AppState>,
    Path((user_id, job_id)): Path<(String, Uuid)>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let owner = state.engine.job(job_id).await?.user_id;
    if owner != user_id {
        tracing::debug!(job_id = %job_id, "Status requested by non-owner");
        return Err(ApiError::NotFound(format!("Job {job_id} not found")));
    }

    let job = state.engine.status(job_id).await?;

    if job.state == JobState::Submitted && state.poller.spawn(job_id) {
        tracing::info!(job_id = %job_id, "Reconciliation poller started from status request");
    }

    Ok(Json(job.into()))
}
