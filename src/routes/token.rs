use std::str::FromStr;

use axum::extract::State;
use axum::Json;
use garde::Validate;
use strum::IntoEnumIterator;

use crate::app_state::AppState;
use crate::engine::JobRequest;
use crate::models::job::Product;
use crate::models::verification::{TokenRequest, TokenResponse};
use crate::routes::error::ApiError;

/// POST /token — create a job and mint its capture token.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    body.validate()?;

    let product = match body.product.as_deref() {
        None => Product::BiometricKyc,
        Some(name) => Product::from_str(name.trim()).map_err(|_| ApiError::UnknownProduct {
            name: name.to_string(),
            valid: Product::iter().map(<&'static str>::from).collect(),
        })?,
    };

    let job = state
        .engine
        .create_job(JobRequest {
            job_id: None,
            user_id: body.user_id,
            product,
            callback_url: body.callback_url,
        })
        .await?;

    let (job, issued) = state.engine.issue_token(job.job_id).await?;

    Ok(Json(TokenResponse {
        success: true,
        job_id: job.job_id,
        token: issued.token,
        user_id: job.user_id,
        partner_id: issued.partner_id,
        environment: issued.environment.to_string(),
    }))
}
