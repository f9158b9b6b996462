use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod callback;
pub mod error;
pub mod health;
pub mod metrics;
pub mod operator;
pub mod products;
pub mod status;
pub mod submit;
pub mod token;

/// API routes. `/metrics` is mounted separately with its own state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/products", get(products::list_products))
        .route("/token", post(token::issue_token))
        .route("/submit", post(submit::submit_evidence))
        .route("/callback", post(callback::receive_callback))
        .route("/status/{user_id}/{job_id}", get(status::job_status))
        .route("/callbacks/recent", get(operator::recent_callbacks))
        .route("/operator/incidents", get(operator::incidents))
        .with_state(state)
}
