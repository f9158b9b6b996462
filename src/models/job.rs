use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Verification product requested by the client. Closed set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Product {
    Authentication,
    BasicKyc,
    Smartselfie,
    BiometricKyc,
    EnhancedKyc,
    DocVerification,
}

impl Product {
    /// Provider job type code for this product.
    pub fn job_type(self) -> i32 {
        match self {
            Product::DocVerification => 5,
            Product::EnhancedKyc => 1,
            Product::BiometricKyc => 1,
            Product::Smartselfie => 4,
            Product::BasicKyc => 1,
            Product::Authentication => 2,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Product::Authentication => "Authentication",
            Product::BasicKyc => "Basic KYC",
            Product::Smartselfie => "SmartSelfie",
            Product::BiometricKyc => "Biometric KYC",
            Product::EnhancedKyc => "Enhanced KYC",
            Product::DocVerification => "Document Verification",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Product::Authentication => "User authentication",
            Product::BasicKyc => "Basic identity verification",
            Product::Smartselfie => "Selfie verification",
            Product::BiometricKyc => "Biometric identity verification",
            Product::EnhancedKyc => "Advanced identity verification",
            Product::DocVerification => "Document verification only",
        }
    }

    /// Enhanced KYC matches against government records and needs full ID info.
    pub fn requires_id_info(self) -> bool {
        matches!(self, Product::EnhancedKyc)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Lifecycle state of a verification job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    TokenIssued,
    Submitted,
    CallbackReceived,
    PollConfirmed,
    Complete,
    Failed,
    Expired,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed | JobState::Expired)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Channel that last mutated a job record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateSource {
    Callback,
    Poll,
    None,
}

impl UpdateSource {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Structured outcome reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub result_code: String,
    pub result_text: Option<String>,
    pub confidence: Option<f64>,
    /// Per-check sub-results (e.g. `Actions`, `government_check`).
    #[serde(default)]
    pub checks: BTreeMap<String, serde_json::Value>,
}

/// A verification job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: Uuid,
    pub user_id: String,
    pub product: Product,
    pub job_type: i32,
    pub callback_url: Option<String>,
    pub state: JobState,
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    pub update_source: UpdateSource,
    pub version: u64,
}

/// Parameters for inserting a job. `job_id` is generated when absent.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: Option<Uuid>,
    pub user_id: String,
    pub product: Product,
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewJob {
    pub fn into_job(self, job_id: Uuid) -> Job {
        Job {
            job_id,
            user_id: self.user_id,
            product: self.product,
            job_type: self.product.job_type(),
            callback_url: self.callback_url,
            state: JobState::Created,
            result: None,
            created_at: self.created_at,
            last_transition_at: self.created_at,
            update_source: UpdateSource::None,
            version: 0,
        }
    }
}
