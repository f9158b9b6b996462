use axum::extract::State;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::verification::{SubmitRequest, SubmitResponse};
use crate::routes::error::ApiError;

/// POST /submit — forward captured evidence and start reconciliation polling.
pub async fn submit_evidence(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    body.validate()?;

    let job = state.engine.job(body.job_id).await?;
    let missing = body.evidence.missing_id_fields(job.product);
    if !missing.is_empty() {
        return Err(ApiError::Validation(format!(
            "id_info: missing required fields for {}: {}",
            job.product,
            missing.join(", ")
        )));
    }

    let job = state.engine.submit(body.job_id, body.evidence).await?;
    state.poller.spawn(job.job_id);

    Ok(Json(SubmitResponse {
        accepted: true,
        job_id: job.job_id,
        state: job.state,
    }))
}
