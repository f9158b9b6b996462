//! Operator views over the in-process audit logs. Newest entries first.

use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::services::audit::{Incident, ReceivedCallback};

/// GET /callbacks/recent
pub async fn recent_callbacks(State(state): State<AppState>) -> Json<Vec<ReceivedCallback>> {
    let mut callbacks = state.callbacks.snapshot();
    callbacks.reverse();
    Json(callbacks)
}

/// GET /operator/incidents
pub async fn incidents(State(state): State<AppState>) -> Json<Vec<Incident>> {
    let mut incidents = state.incidents().snapshot();
    incidents.reverse();
    Json(incidents)
}
