use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::engine::{CallbackDisposition, EngineError};
use crate::models::provider::CallbackPayload;
use crate::models::verification::CallbackAck;
use crate::routes::error::ApiError;
use crate::services::audit::{IncidentKind, ReceivedCallback};
use crate::services::signer::verify_callback_signature;

pub const SIGNATURE_HEADER: &str = "x-smile-signature";

/// POST /callback — provider push notification.
///
/// Always acknowledged with 200 so the provider stops retrying; anything that
/// could not be applied is reported through the operator channel instead. The
/// one exception is a missing or invalid signature when verification is on.
pub async fn receive_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.settings.verify_callback_signatures {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_callback_signature(&state.settings.api_key, &body, signature) {
            tracing::warn!(bytes = body.len(), "Callback rejected: bad signature");
            metrics::counter!("kyc_callbacks_total", "outcome" => "unauthorized").increment(1);
            return ApiError::Unauthorized("Invalid callback signature".into()).into_response();
        }
    }

    let received_at = state.engine.now();
    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
    });

    let (job_id, processed, outcome) = process(&state, &raw).await;
    metrics::counter!("kyc_callbacks_total", "outcome" => outcome).increment(1);

    state.callbacks.push(ReceivedCallback {
        received_at,
        user_id: field(&raw, "user_id"),
        job_id: field(&raw, "job_id"),
        result_code: field(&raw, "ResultCode"),
        processed,
        body: raw,
    });

    (
        StatusCode::OK,
        Json(CallbackAck {
            success: true,
            processed,
            received_at,
            job_id,
        }),
    )
        .into_response()
}

fn field(raw: &serde_json::Value, key: &str) -> Option<String> {
    raw.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Route one callback into the engine. Returns the echoed job id, whether the
/// callback was applied, and a metrics label.
async fn process(
    state: &AppState,
    raw: &serde_json::Value,
) -> (Option<String>, bool, &'static str) {
    let payload: CallbackPayload = match serde_json::from_value(raw.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            state.incidents().record(
                IncidentKind::UnroutableCallback,
                None,
                format!("malformed callback body: {e}"),
            );
            return (field(raw, "job_id"), false, "malformed");
        }
    };
    let echoed = Some(payload.job_id.clone());

    let Ok(job_id) = Uuid::parse_str(payload.job_id.trim()) else {
        state.incidents().record(
            IncidentKind::UnroutableCallback,
            None,
            format!("callback job id '{}' is not a known job id", payload.job_id),
        );
        return (echoed, false, "unroutable");
    };

    match state.engine.job(job_id).await {
        Ok(job) if job.user_id != payload.user_id => {
            state.incidents().record(
                IncidentKind::UnroutableCallback,
                Some(job_id),
                format!(
                    "callback user '{}' does not own job (owner '{}')",
                    payload.user_id, job.user_id
                ),
            );
            return (echoed, false, "unroutable");
        }
        Ok(_) => {}
        Err(EngineError::NotFound(_)) => {
            state.incidents().record(
                IncidentKind::UnroutableCallback,
                Some(job_id),
                "callback for unknown job",
            );
            return (echoed, false, "unroutable");
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Callback lookup failed");
            return (echoed, false, "error");
        }
    }

    match state.engine.apply_callback(job_id, &payload).await {
        Ok(CallbackDisposition::Applied(job)) => {
            tracing::info!(
                job_id = %job_id,
                state = %job.state,
                result_code = %payload.result_code,
                "Callback applied"
            );
            (echoed, true, "applied")
        }
        Ok(CallbackDisposition::Duplicate(_)) => (echoed, true, "duplicate"),
        Err(EngineError::InconsistentCallback { .. }) => (echoed, false, "inconsistent"),
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Callback not applied");
            (echoed, false, "rejected")
        }
    }
}
