use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::EngineError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_products: Option<Vec<&'static str>>,
}

/// Error returned by client-facing handlers.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// Malformed or invalid request body.
    Validation(String),
    /// Product name outside the catalog.
    UnknownProduct {
        name: String,
        valid: Vec<&'static str>,
    },
    /// Caller is not allowed to see the resource; reported as not found.
    NotFound(String),
    Unauthorized(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::Validation(report.to_string())
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidState { .. }
        | EngineError::Conflict { .. }
        | EngineError::DuplicateJob(_)
        | EngineError::InconsistentCallback { .. } => StatusCode::CONFLICT,
        EngineError::TokenIssuance(_) | EngineError::Submission(_) | EngineError::PollFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        EngineError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut valid_products = None;
        let (status, error, details) = match self {
            ApiError::Engine(err) => {
                let status = engine_status(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                // store internals stay in the logs
                let error = match err {
                    EngineError::Store(_) => "Internal storage error".to_string(),
                    other => other.to_string(),
                };
                (status, error, None)
            }
            ApiError::Validation(details) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation failed".to_string(),
                Some(details),
            ),
            ApiError::UnknownProduct { name, valid } => {
                valid_products = Some(valid);
                (
                    StatusCode::BAD_REQUEST,
                    format!("Invalid product: {name}"),
                    None,
                )
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what, None),
            ApiError::Unauthorized(why) => (StatusCode::UNAUTHORIZED, why, None),
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error,
                details,
                valid_products,
            }),
        )
            .into_response()
    }
}
