//! Provider HTTP adapter against a mock provider.

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kyc_relay::config::Environment;
use kyc_relay::models::job::Product;
use kyc_relay::models::provider::{Evidence, EvidenceImage, ProviderOutcome};
use kyc_relay::services::deadline::Deadline;
use kyc_relay::services::provider::{
    ProviderClient, ProviderError, Submission, VerificationProvider,
};
use kyc_relay::services::signer::{Signer, SignerError, SigningRequest};

fn client(server: &MockServer) -> ProviderClient {
    ProviderClient::new(
        format!("{}/v1/", server.uri()),
        "1234",
        "api-key",
        Environment::Sandbox,
        Some("https://relay.example.com/callback".into()),
    )
    .unwrap()
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

fn submission(job_id: Uuid) -> Submission {
    Submission {
        user_id: "u1".into(),
        job_id,
        product: Product::BiometricKyc,
        job_type: 1,
        callback_url: None,
        evidence: Evidence {
            images: vec![EvidenceImage {
                image: "aGVsbG8=".into(),
                image_type_id: "2".into(),
            }],
            id_info: None,
            meta: None,
        },
    }
}

#[tokio::test]
async fn test_submit_sends_partner_params() {
    let server = MockServer::start().await;
    let job_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/v1/jobs"))
        .and(body_partial_json(json!({
            "partner_id": "1234",
            "callback_url": "https://relay.example.com/callback",
            "partner_params": { "user_id": "u1", "job_id": job_id.to_string(), "job_type": 1 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "smile_job_id": "000042" })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client(&server)
        .submit(&submission(job_id), deadline())
        .await
        .unwrap();
    assert_eq!(receipt.provider_job_id.as_deref(), Some("000042"));
}

#[tokio::test]
async fn test_submit_rejection_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/jobs"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid image"))
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&submission(Uuid::new_v4()), deadline())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Rejected { status: 400, ref message } if message == "invalid image"
    ));
}

#[tokio::test]
async fn test_job_status_outcomes() {
    let server = MockServer::start().await;
    let pending_id = Uuid::new_v4();
    let done_id = Uuid::new_v4();
    let broken_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/job_status"))
        .and(body_partial_json(json!({ "job_id": pending_id.to_string() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_complete": false,
            "job_success": false,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/job_status"))
        .and(body_partial_json(json!({ "job_id": done_id.to_string() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_complete": true,
            "job_success": false,
            "code": "2302",
            "result": {
                "ResultCode": "1001",
                "ResultText": "Unable to verify",
                "ConfidenceValue": "12.5",
                "Actions": { "Selfie_To_ID_Card_Compare": "Failed" },
            },
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/job_status"))
        .and(body_partial_json(json!({ "job_id": broken_id.to_string() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_complete": true })))
        .mount(&server)
        .await;

    let client = client(&server);

    let pending = client.job_status("u1", pending_id, deadline()).await.unwrap();
    assert_eq!(pending, ProviderOutcome::Pending);

    match client.job_status("u1", done_id, deadline()).await.unwrap() {
        ProviderOutcome::Failure(result) => {
            assert_eq!(result.result_code, "1001");
            assert_eq!(result.result_text.as_deref(), Some("Unable to verify"));
            assert_eq!(result.confidence, Some(12.5));
            assert!(result.checks.contains_key("Actions"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let err = client
        .job_status("u1", broken_id, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}

#[tokio::test]
async fn test_slow_provider_hits_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/job_status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "job_complete": false }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .job_status("u1", Uuid::new_v4(), Deadline::after(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Http(ref e) if e.is_timeout()));
}

#[tokio::test]
async fn test_remote_token_issuance() {
    let server = MockServer::start().await;
    let job_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_partial_json(json!({
            "partner_id": "1234",
            "user_id": "u1",
            "job_id": job_id.to_string(),
            "product": "biometric_kyc",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "remote-token" })))
        .mount(&server)
        .await;

    let request = SigningRequest {
        user_id: "u1".into(),
        job_id,
        product: Product::BiometricKyc,
        job_type: 1,
        callback_url: None,
    };
    let issued = client(&server)
        .issue_token(&request, deadline())
        .await
        .unwrap();
    assert_eq!(issued.token, "remote-token");
    assert_eq!(issued.partner_id, "1234");
    assert_eq!(issued.environment, Environment::Sandbox);
}

#[tokio::test]
async fn test_remote_token_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad signature"))
        .mount(&server)
        .await;

    let request = SigningRequest {
        user_id: "u1".into(),
        job_id: Uuid::new_v4(),
        product: Product::Smartselfie,
        job_type: 4,
        callback_url: None,
    };
    let err = client(&server)
        .issue_token(&request, deadline())
        .await
        .unwrap_err();
    assert!(matches!(err, SignerError::Rejected { status: 401, .. }));
}
