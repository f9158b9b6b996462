use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — Prometheus text exposition of the kyc_* series.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the metrics the engine and routes emit.
pub fn describe() {
    metrics::describe_counter!("kyc_jobs_created_total", "Jobs created, by product");
    metrics::describe_counter!(
        "kyc_transitions_total",
        "Applied state transitions, by target state"
    );
    metrics::describe_counter!("kyc_jobs_completed", "Jobs finalized as COMPLETE");
    metrics::describe_counter!("kyc_jobs_failed", "Jobs finalized as FAILED");
    metrics::describe_counter!("kyc_jobs_expired", "Jobs expired past their max age");
    metrics::describe_counter!(
        "kyc_cas_conflicts_total",
        "Compare-and-swap attempts that lost to a concurrent writer"
    );
    metrics::describe_counter!("kyc_callbacks_total", "Callbacks received, by outcome");
    metrics::describe_counter!(
        "kyc_duplicate_callbacks_total",
        "Identical callback re-deliveries ignored"
    );
    metrics::describe_counter!("kyc_poll_attempts_total", "Provider status queries issued");
    metrics::describe_counter!(
        "kyc_external_failures_total",
        "Failed or timed-out provider calls, by call"
    );
    metrics::describe_counter!("kyc_incidents_total", "Operator incidents, by kind");
    metrics::describe_histogram!(
        "kyc_provider_call_seconds",
        "Latency of successful provider calls, by call"
    );
}
