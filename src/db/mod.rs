//! Postgres backing for the job store: the `kyc_jobs` pool, its
//! migrations, and the versioned queries in [`queries`].

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod queries;

/// Every CAS retry holds a connection only for one read and one conditional
/// update, so a small pool serves both the API and the background sweeper.
const MAX_CONNECTIONS: u32 = 20;
const MIN_CONNECTIONS: u32 = 2;
/// Kept below the poller's attempt timeout so a starved pool surfaces as a
/// store error that the next tick retries.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect the job-store pool.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(MIN_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;
    tracing::info!(max_connections = MAX_CONNECTIONS, "Job store pool connected");
    Ok(pool)
}

/// Apply the `kyc_jobs` schema from `./migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
