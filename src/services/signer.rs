use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::Environment;
use crate::models::job::{Job, Product};
use crate::services::deadline::Deadline;

type HmacSha256 = Hmac<Sha256>;

/// Inputs the signer needs to mint a capture token for one job.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    pub user_id: String,
    pub job_id: Uuid,
    pub product: Product,
    pub job_type: i32,
    pub callback_url: Option<String>,
}

impl From<&Job> for SigningRequest {
    fn from(job: &Job) -> Self {
        Self {
            user_id: job.user_id.clone(),
            job_id: job.job_id,
            product: job.product,
            job_type: job.job_type,
            callback_url: job.callback_url.clone(),
        }
    }
}

/// Opaque credential handed to the client SDK.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub partner_id: String,
    pub environment: Environment,
}

/// Produces signed capture tokens from partner identity and secret.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn issue_token(
        &self,
        request: &SigningRequest,
        deadline: Deadline,
    ) -> Result<IssuedToken, SignerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Signing key rejected")]
    InvalidKey,

    #[error("Token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),

    #[error("Token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Deadline elapsed before the token was issued")]
    DeadlineElapsed,
}

/// Request signature: base64 HMAC-SHA256 over `timestamp + partner_id + "sid_request"`.
pub fn request_signature(
    api_key: &str,
    partner_id: &str,
    timestamp: &str,
) -> Result<String, SignerError> {
    let mut mac =
        HmacSha256::new_from_slice(api_key.as_bytes()).map_err(|_| SignerError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(partner_id.as_bytes());
    mac.update(b"sid_request");
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Hex HMAC-SHA256 of a raw callback body.
pub fn callback_signature(api_key: &str, body: &[u8]) -> Result<String, SignerError> {
    let mut mac =
        HmacSha256::new_from_slice(api_key.as_bytes()).map_err(|_| SignerError::InvalidKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a callback signature header.
pub fn verify_callback_signature(api_key: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(api_key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Claims embedded in a locally signed token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub partner_id: String,
    pub user_id: String,
    pub job_id: String,
    pub job_type: i32,
    pub product: String,
    pub callback_url: Option<String>,
    pub timestamp: String,
    pub signature: String,
    pub environment: String,
    pub exp: i64,
}

/// Signs tokens in-process with the partner API key.
pub struct HmacSigner {
    partner_id: String,
    api_key: String,
    environment: Environment,
    default_callback_url: Option<String>,
    ttl: chrono::Duration,
}

impl HmacSigner {
    pub fn new(
        partner_id: impl Into<String>,
        api_key: impl Into<String>,
        environment: Environment,
        default_callback_url: Option<String>,
    ) -> Self {
        Self {
            partner_id: partner_id.into(),
            api_key: api_key.into(),
            environment,
            default_callback_url,
            ttl: chrono::Duration::hours(1),
        }
    }
}

#[async_trait]
impl Signer for HmacSigner {
    async fn issue_token(
        &self,
        request: &SigningRequest,
        deadline: Deadline,
    ) -> Result<IssuedToken, SignerError> {
        if deadline.is_elapsed() {
            return Err(SignerError::DeadlineElapsed);
        }

        let now = chrono::Utc::now();
        let timestamp = now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let signature = request_signature(&self.api_key, &self.partner_id, &timestamp)?;

        let claims = TokenClaims {
            partner_id: self.partner_id.clone(),
            user_id: request.user_id.clone(),
            job_id: request.job_id.to_string(),
            job_type: request.job_type,
            product: request.product.to_string(),
            callback_url: request
                .callback_url
                .clone()
                .or_else(|| self.default_callback_url.clone()),
            timestamp,
            signature,
            environment: self.environment.to_string(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.api_key.as_bytes()),
        )?;

        Ok(IssuedToken {
            token,
            partner_id: self.partner_id.clone(),
            environment: self.environment,
        })
    }
}
