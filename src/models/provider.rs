//! Provider-facing payload shapes.
//!
//! Callback bodies and status-query responses arrive loosely typed; both are
//! validated here into a [`ProviderOutcome`] before they reach the lifecycle
//! engine.

use std::collections::BTreeMap;

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::job::{JobResult, Product};

/// Result codes the provider uses for an approved verification.
pub const SUCCESS_CODES: &[&str] = &["0000", "0810", "0820", "1012", "1020", "1210"];

pub fn is_success_code(code: &str) -> bool {
    SUCCESS_CODES.contains(&code)
}

/// Validated provider verdict for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success(JobResult),
    Failure(JobResult),
    Pending,
}

impl ProviderOutcome {
    pub fn from_result(result: JobResult) -> Self {
        if result.success {
            ProviderOutcome::Success(result)
        } else {
            ProviderOutcome::Failure(result)
        }
    }

    pub fn result(&self) -> Option<&JobResult> {
        match self {
            ProviderOutcome::Success(r) | ProviderOutcome::Failure(r) => Some(r),
            ProviderOutcome::Pending => None,
        }
    }
}

/// Captured image forwarded to the provider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvidenceImage {
    /// Base64 image data.
    #[garde(length(min = 1))]
    pub image: String,

    #[garde(length(min = 1, max = 4))]
    pub image_type_id: String,
}

/// Identity document details used for government database matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct IdInfo {
    #[garde(length(max = 100))]
    pub first_name: Option<String>,
    #[garde(length(max = 100))]
    pub last_name: Option<String>,
    /// YYYY-MM-DD
    #[garde(length(max = 10))]
    pub dob: Option<String>,
    #[garde(length(min = 2, max = 2))]
    pub country: Option<String>,
    #[garde(length(max = 40))]
    pub id_type: Option<String>,
    #[garde(length(max = 64))]
    pub id_number: Option<String>,
    #[garde(skip)]
    pub gender: Option<String>,
}

impl IdInfo {
    /// Names of required fields that are absent or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields: [(&'static str, &Option<String>); 6] = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("dob", &self.dob),
            ("country", &self.country),
            ("id_type", &self.id_type),
            ("id_number", &self.id_number),
        ];
        fields
            .into_iter()
            .filter(|(_, v)| v.as_deref().map(str::trim).unwrap_or("").is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Evidence captured by the client during the out-of-band capture flow.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Evidence {
    #[garde(length(min = 1, max = 8), dive)]
    pub images: Vec<EvidenceImage>,

    #[garde(dive)]
    pub id_info: Option<IdInfo>,

    /// Client SDK metadata (library version etc.), forwarded untouched.
    #[garde(skip)]
    pub meta: Option<Value>,
}

impl Evidence {
    /// Required ID fields missing for `product`. Empty when nothing is missing.
    pub fn missing_id_fields(&self, product: Product) -> Vec<&'static str> {
        if !product.requires_id_info() {
            return Vec::new();
        }
        match &self.id_info {
            Some(info) => info.missing_fields(),
            None => IdInfo::default().missing_fields(),
        }
    }
}

/// Callback body pushed by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub user_id: String,
    pub job_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: String,
    #[serde(rename = "ResultText", default)]
    pub result_text: Option<String>,
    #[serde(rename = "ConfidenceValue", default)]
    pub confidence_value: Option<Value>,
    #[serde(default)]
    pub job_type: Option<Value>,
    /// Remaining result fields (`Actions`, `government_check`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CallbackPayload {
    pub fn to_result(&self) -> JobResult {
        JobResult {
            success: is_success_code(&self.result_code),
            result_code: self.result_code.clone(),
            result_text: self.result_text.clone(),
            confidence: self.confidence_value.as_ref().and_then(parse_confidence),
            checks: self
                .extra
                .iter()
                .filter(|(k, _)| !IGNORED_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn outcome(&self) -> ProviderOutcome {
        ProviderOutcome::from_result(self.to_result())
    }
}

/// Transport/bookkeeping keys that carry no verification content.
const IGNORED_KEYS: &[&str] = &["timestamp", "signature", "sec_key", "PartnerParams", "partner_id"];

/// Provider confidence comes as either a number or a numeric string.
fn parse_confidence(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Response body of the provider's job status query.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEnvelope {
    #[serde(default)]
    pub job_complete: bool,
    #[serde(default)]
    pub job_success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl StatusEnvelope {
    /// Validate into an outcome. A completed job with no result code at all is
    /// malformed rather than silently successful.
    pub fn into_outcome(self) -> Result<ProviderOutcome, String> {
        if !self.job_complete {
            return Ok(ProviderOutcome::Pending);
        }

        let mut fields = match self.result {
            Some(Value::Object(map)) => map,
            Some(Value::String(text)) => {
                let mut map = serde_json::Map::new();
                map.insert("ResultText".into(), Value::String(text));
                map
            }
            _ => serde_json::Map::new(),
        };

        let result_code = fields
            .remove("ResultCode")
            .and_then(|v| v.as_str().map(str::to_string))
            .or(self.code)
            .ok_or_else(|| "completed status carries no result code".to_string())?;
        let result_text = fields
            .remove("ResultText")
            .and_then(|v| v.as_str().map(str::to_string));
        let confidence = fields.remove("ConfidenceValue").as_ref().and_then(parse_confidence);

        let result = JobResult {
            success: self.job_success && is_success_code(&result_code),
            result_code,
            result_text,
            confidence,
            checks: fields
                .into_iter()
                .filter(|(k, _)| !IGNORED_KEYS.contains(&k.as_str()))
                .collect(),
        };
        Ok(ProviderOutcome::from_result(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_callback_success_code() {
        let payload: CallbackPayload = serde_json::from_value(json!({
            "user_id": "u1",
            "job_id": "j1",
            "ResultCode": "0000",
            "ResultText": "Success",
            "ConfidenceValue": "99.5",
            "Actions": {"Liveness_Check": "Passed"},
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let result = payload.to_result();
        assert!(result.success);
        assert_eq!(result.confidence, Some(99.5));
        assert!(result.checks.contains_key("Actions"));
        assert!(!result.checks.contains_key("timestamp"));
        assert!(matches!(payload.outcome(), ProviderOutcome::Success(_)));
    }

    #[test]
    fn test_callback_failure_code() {
        let payload: CallbackPayload = serde_json::from_value(json!({
            "user_id": "u1",
            "job_id": "j1",
            "ResultCode": "1001",
            "ResultText": "Failure"
        }))
        .unwrap();
        assert!(matches!(payload.outcome(), ProviderOutcome::Failure(_)));
    }

    #[test]
    fn test_status_pending_when_incomplete() {
        let env: StatusEnvelope =
            serde_json::from_value(json!({"job_complete": false, "job_success": false})).unwrap();
        assert_eq!(env.into_outcome().unwrap(), ProviderOutcome::Pending);
    }

    #[test]
    fn test_status_complete_failure() {
        let env: StatusEnvelope = serde_json::from_value(json!({
            "job_complete": true,
            "job_success": false,
            "code": "2302",
            "result": {"ResultCode": "1001", "ResultText": "Rejected"}
        }))
        .unwrap();
        match env.into_outcome().unwrap() {
            ProviderOutcome::Failure(r) => {
                assert_eq!(r.result_code, "1001");
                assert_eq!(r.result_text.as_deref(), Some("Rejected"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_status_complete_without_code_is_malformed() {
        let env: StatusEnvelope =
            serde_json::from_value(json!({"job_complete": true, "job_success": true})).unwrap();
        assert!(env.into_outcome().is_err());
    }

    #[test]
    fn test_missing_id_fields_only_for_enhanced_kyc() {
        let evidence = Evidence {
            images: vec![EvidenceImage {
                image: "aGVsbG8=".into(),
                image_type_id: "2".into(),
            }],
            id_info: Some(IdInfo {
                first_name: Some("Ada".into()),
                country: Some("NG".into()),
                ..Default::default()
            }),
            meta: None,
        };
        assert!(evidence.missing_id_fields(Product::BiometricKyc).is_empty());
        assert_eq!(
            evidence.missing_id_fields(Product::EnhancedKyc),
            vec!["last_name", "dob", "id_type", "id_number"]
        );
    }

    #[test]
    fn test_evidence_requires_images() {
        let evidence = Evidence {
            images: vec![],
            id_info: None,
            meta: None,
        };
        assert!(evidence.validate().is_err());
    }
}
