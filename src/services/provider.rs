use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::Environment;
use crate::models::job::Product;
use crate::models::provider::{Evidence, ProviderOutcome, StatusEnvelope};
use crate::services::deadline::Deadline;
use crate::services::signer::{
    request_signature, IssuedToken, Signer, SignerError, SigningRequest,
};

/// Everything the provider needs to start processing a job.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: String,
    pub job_id: Uuid,
    pub product: Product,
    pub job_type: i32,
    pub callback_url: Option<String>,
    pub evidence: Evidence,
}

/// Provider acknowledgement of an accepted submission.
#[derive(Debug, Clone, Default)]
pub struct SubmissionReceipt {
    pub provider_job_id: Option<String>,
}

/// Remote verification provider.
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    /// Hand evidence over for processing. Returns once intake is accepted.
    async fn submit(
        &self,
        submission: &Submission,
        deadline: Deadline,
    ) -> Result<SubmissionReceipt, ProviderError>;

    /// Query the current outcome of a job.
    async fn job_status(
        &self,
        user_id: &str,
        job_id: Uuid,
        deadline: Deadline,
    ) -> Result<ProviderOutcome, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Deadline elapsed before the provider was called")]
    DeadlineElapsed,

    #[error("Request signing failed: {0}")]
    Signing(#[from] SignerError),
}

#[derive(Deserialize)]
struct TokenEnvelope {
    token: String,
}

#[derive(Deserialize)]
struct SubmitEnvelope {
    #[serde(default)]
    smile_job_id: Option<String>,
}

/// HTTP client for the provider REST API.
///
/// Also implements [`Signer`] through the provider's token endpoint.
pub struct ProviderClient {
    http: Client,
    base_url: String,
    partner_id: String,
    api_key: String,
    environment: Environment,
    default_callback_url: Option<String>,
}

impl ProviderClient {
    pub fn new(
        base_url: impl Into<String>,
        partner_id: impl Into<String>,
        api_key: impl Into<String>,
        environment: Environment,
        default_callback_url: Option<String>,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("kyc-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            partner_id: partner_id.into(),
            api_key: api_key.into(),
            environment,
            default_callback_url,
        })
    }

    /// Default API root for an environment.
    pub fn default_base_url(environment: Environment) -> &'static str {
        match environment {
            Environment::Sandbox => "https://testapi.smileidentity.com/v1",
            Environment::Production => "https://api.smileidentity.com/v1",
        }
    }

    fn signed_fields(&self) -> Result<(String, String), SignerError> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let signature = request_signature(&self.api_key, &self.partner_id, &timestamp)?;
        Ok((timestamp, signature))
    }

    fn callback_for(&self, explicit: &Option<String>) -> Option<String> {
        explicit.clone().or_else(|| self.default_callback_url.clone())
    }

    async fn rejected(response: reqwest::Response) -> (u16, String) {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        (status, message)
    }
}

#[async_trait]
impl VerificationProvider for ProviderClient {
    async fn submit(
        &self,
        submission: &Submission,
        deadline: Deadline,
    ) -> Result<SubmissionReceipt, ProviderError> {
        if deadline.is_elapsed() {
            return Err(ProviderError::DeadlineElapsed);
        }
        let (timestamp, signature) = self.signed_fields()?;
        let evidence = &submission.evidence;

        let images: Vec<_> = evidence
            .images
            .iter()
            .map(|img| json!({"image": img.image, "image_type_id": img.image_type_id}))
            .collect();

        let body = json!({
            "partner_id": self.partner_id,
            "timestamp": timestamp,
            "signature": signature,
            "callback_url": self.callback_for(&submission.callback_url),
            "partner_params": {
                "user_id": submission.user_id,
                "job_id": submission.job_id.to_string(),
                "job_type": submission.job_type,
            },
            "images": images,
            "id_info": evidence.id_info,
            "meta": evidence.meta,
            "options": {
                "return_job_status": false,
                "return_images": false,
                "enhanced_kyc": submission.product == Product::EnhancedKyc,
            },
        });

        let response = self
            .http
            .post(format!("{}/jobs", self.base_url))
            .timeout(deadline.remaining())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = Self::rejected(response).await;
            return Err(ProviderError::Rejected { status, message });
        }

        let envelope: SubmitEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(SubmissionReceipt {
            provider_job_id: envelope.smile_job_id,
        })
    }

    async fn job_status(
        &self,
        user_id: &str,
        job_id: Uuid,
        deadline: Deadline,
    ) -> Result<ProviderOutcome, ProviderError> {
        if deadline.is_elapsed() {
            return Err(ProviderError::DeadlineElapsed);
        }
        let (timestamp, signature) = self.signed_fields()?;

        let response = self
            .http
            .post(format!("{}/job_status", self.base_url))
            .timeout(deadline.remaining())
            .json(&json!({
                "partner_id": self.partner_id,
                "timestamp": timestamp,
                "signature": signature,
                "user_id": user_id,
                "job_id": job_id.to_string(),
                "image_links": false,
                "history": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = Self::rejected(response).await;
            return Err(ProviderError::Rejected { status, message });
        }

        let envelope: StatusEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        envelope.into_outcome().map_err(ProviderError::Malformed)
    }
}

#[async_trait]
impl Signer for ProviderClient {
    async fn issue_token(
        &self,
        request: &SigningRequest,
        deadline: Deadline,
    ) -> Result<IssuedToken, SignerError> {
        if deadline.is_elapsed() {
            return Err(SignerError::DeadlineElapsed);
        }
        let (timestamp, signature) = self.signed_fields()?;

        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .timeout(deadline.remaining())
            .json(&json!({
                "partner_id": self.partner_id,
                "timestamp": timestamp,
                "signature": signature,
                "user_id": request.user_id,
                "job_id": request.job_id.to_string(),
                "product": request.product.as_str(),
                "callback_url": self.callback_for(&request.callback_url),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = Self::rejected(response).await;
            return Err(SignerError::Rejected { status, message });
        }

        let envelope: TokenEnvelope = response.json().await?;
        Ok(IssuedToken {
            token: envelope.token,
            partner_id: self.partner_id.clone(),
            environment: self.environment,
        })
    }
}
