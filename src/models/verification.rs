use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{Job, JobResult, JobState, Product, UpdateSource};
use super::provider::Evidence;

/// Request for a short-lived capture token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    /// Blank or omitted gets a generated id.
    #[garde(length(max = 128))]
    pub user_id: Option<String>,

    /// Product name; defaults to biometric_kyc when omitted.
    #[garde(length(min = 1, max = 32))]
    pub product: Option<String>,

    #[garde(length(min = 1, max = 2048))]
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub token: String,
    pub user_id: String,
    pub partner_id: String,
    pub environment: String,
}

/// Evidence submission for a job holding a token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[garde(skip)]
    pub job_id: Uuid,

    #[garde(dive)]
    pub evidence: Evidence,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub accepted: bool,
    pub job_id: Uuid,
    pub state: JobState,
}

/// Acknowledgement returned to the provider for every callback.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub success: bool,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
    pub job_id: Option<String>,
}

/// Client-facing projection of a job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub user_id: String,
    pub product: Product,
    pub state: JobState,
    /// True while the outcome is still being awaited from the provider.
    pub pending: bool,
    pub result: Option<JobResult>,
    pub update_source: UpdateSource,
    pub last_transition_at: DateTime<Utc>,
    pub version: u64,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            pending: !job.state.is_terminal(),
            job_id: job.job_id,
            user_id: job.user_id,
            product: job.product,
            state: job.state,
            result: job.result,
            update_source: job.update_source,
            last_transition_at: job.last_transition_at,
            version: job.version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductInfo {
    pub id: Product,
    pub name: &'static str,
    pub description: &'static str,
}
