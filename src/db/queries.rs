use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{Job, JobResult, JobState, Product, UpdateSource};
use crate::store::StoreError;

const JOB_COLUMNS: &str = "id, user_id, product, job_type, callback_url, state, result, \
                           update_source, version, created_at, last_transition_at";

/// Insert a new job. Returns `None` when the id is already taken.
pub async fn insert_job(pool: &PgPool, job: &Job) -> Result<Option<Job>, StoreError> {
    let result = encode_result(job.result.as_ref())?;
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO kyc_jobs (id, user_id, product, job_type, callback_url, state, result,
                              update_source, version, created_at, last_transition_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO NOTHING
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job.job_id)
    .bind(&job.user_id)
    .bind(job.product.as_str())
    .bind(job.job_type)
    .bind(&job.callback_url)
    .bind(job.state.as_str())
    .bind(result)
    .bind(job.update_source.as_str())
    .bind(to_db_version(job.version)?)
    .bind(job.created_at)
    .bind(job.last_transition_at)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, StoreError> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM kyc_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Write `job` only if the stored version is still `expected_version`.
/// Returns `false` when another writer got there first.
pub async fn update_job_versioned(
    pool: &PgPool,
    job: &Job,
    expected_version: u64,
) -> Result<bool, StoreError> {
    let result = encode_result(job.result.as_ref())?;
    let done = sqlx::query(
        r#"
        UPDATE kyc_jobs
        SET state = $1,
            result = $2,
            update_source = $3,
            version = $4,
            last_transition_at = $5
        WHERE id = $6 AND version = $7
        "#,
    )
    .bind(job.state.as_str())
    .bind(result)
    .bind(job.update_source.as_str())
    .bind(to_db_version(job.version)?)
    .bind(job.last_transition_at)
    .bind(job.job_id)
    .bind(to_db_version(expected_version)?)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() == 1)
}

/// List jobs currently in any of `states`
pub async fn list_jobs_by_state(
    pool: &PgPool,
    states: &[JobState],
) -> Result<Vec<Job>, StoreError> {
    let names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM kyc_jobs WHERE state = ANY($1) ORDER BY last_transition_at"
    ))
    .bind(names)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let product: String = row.try_get("product")?;
    let state: String = row.try_get("state")?;
    let update_source: String = row.try_get("update_source")?;
    let result: Option<serde_json::Value> = row.try_get("result")?;
    let version: i64 = row.try_get("version")?;

    Ok(Job {
        job_id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product: Product::from_str(&product)
            .map_err(|_| StoreError::Corrupt(format!("unknown product {product}")))?,
        job_type: row.try_get("job_type")?,
        callback_url: row.try_get("callback_url")?,
        state: JobState::from_str(&state)
            .map_err(|_| StoreError::Corrupt(format!("unknown state {state}")))?,
        result: result
            .map(serde_json::from_value::<JobResult>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("bad result payload: {e}")))?,
        created_at: row.try_get("created_at")?,
        last_transition_at: row.try_get("last_transition_at")?,
        update_source: UpdateSource::from_str(&update_source)
            .map_err(|_| StoreError::Corrupt(format!("unknown update source {update_source}")))?,
        version: u64::try_from(version)
            .map_err(|_| StoreError::Corrupt(format!("negative version {version}")))?,
    })
}

fn encode_result(result: Option<&JobResult>) -> Result<Option<serde_json::Value>, StoreError> {
    result
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("unencodable result: {e}")))
}

fn to_db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version overflow {version}")))
}
