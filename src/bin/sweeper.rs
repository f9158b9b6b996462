//! Standalone sweeper for deployments running several API replicas against
//! one PostgreSQL job store.

use kyc_relay::{app_state::AppState, config::AppConfig, poller::sweep};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting job sweeper");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    if config.database_url.is_none() {
        tracing::error!("DATABASE_URL is required; an in-memory store has nothing to sweep");
        std::process::exit(1);
    }

    let state = AppState::from_config(&config)
        .await
        .expect("Failed to initialize application state");

    let interval = config.sweep_interval();
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Sweeper ready, starting sweep loop"
    );

    sweep::run_sweeper(state.engine, interval).await;
}
