//! In-process fakes for the signer and provider, plus engine/app builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use kyc_relay::app_state::{AppState, PartnerSettings};
use kyc_relay::config::Environment;
use kyc_relay::engine::{EngineConfig, JobRequest, LifecycleEngine};
use kyc_relay::models::job::{Job, JobResult, JobState, NewJob, Product};
use kyc_relay::models::provider::{is_success_code, Evidence, EvidenceImage, ProviderOutcome};
use kyc_relay::poller::PollerConfig;
use kyc_relay::services::audit::IncidentLog;
use kyc_relay::services::clock::MonotonicClock;
use kyc_relay::services::deadline::Deadline;
use kyc_relay::services::provider::{
    ProviderError, Submission, SubmissionReceipt, VerificationProvider,
};
use kyc_relay::services::signer::{IssuedToken, Signer, SignerError, SigningRequest};
use kyc_relay::store::{JobStore, MemoryJobStore, Mutator, StoreError};

pub const API_KEY: &str = "test-api-key";
pub const PARTNER_ID: &str = "1234";

/// Signer that either issues immediately or never answers.
pub struct TestSigner {
    pub hang: bool,
}

#[async_trait]
impl Signer for TestSigner {
    async fn issue_token(
        &self,
        request: &SigningRequest,
        _deadline: Deadline,
    ) -> Result<IssuedToken, SignerError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(IssuedToken {
            token: format!("token-{}", request.job_id),
            partner_id: PARTNER_ID.to_string(),
            environment: Environment::Sandbox,
        })
    }
}

/// Provider that accepts every submission and answers status queries from a
/// script, falling back to `Pending` once the script runs out.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderOutcome>>,
    status_calls: AtomicUsize,
    submissions: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ProviderOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationProvider for ScriptedProvider {
    async fn submit(
        &self,
        _submission: &Submission,
        _deadline: Deadline,
    ) -> Result<SubmissionReceipt, ProviderError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(SubmissionReceipt::default())
    }

    async fn job_status(
        &self,
        _user_id: &str,
        _job_id: Uuid,
        _deadline: Deadline,
    ) -> Result<ProviderOutcome, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or(ProviderOutcome::Pending))
    }
}

pub fn outcome(code: &str) -> ProviderOutcome {
    ProviderOutcome::from_result(JobResult {
        success: is_success_code(code),
        result_code: code.to_string(),
        result_text: None,
        confidence: None,
        checks: BTreeMap::new(),
    })
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        token_timeout: Duration::from_secs(15),
        submit_timeout: Duration::from_secs(30),
        max_age: Duration::from_secs(300),
        reconcile_grace: Duration::from_secs(5),
        ..EngineConfig::default()
    }
}

pub fn poller_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_secs(3),
        attempt_timeout: Duration::from_secs(10),
    }
}

/// Engine over an in-memory store and a clock that follows tokio time.
pub fn engine(
    provider: Arc<ScriptedProvider>,
    signer: TestSigner,
    config: EngineConfig,
) -> Arc<LifecycleEngine> {
    engine_on(Arc::new(MemoryJobStore::new()), provider, signer, config)
}

pub fn engine_on(
    store: Arc<dyn JobStore>,
    provider: Arc<ScriptedProvider>,
    signer: TestSigner,
    config: EngineConfig,
) -> Arc<LifecycleEngine> {
    Arc::new(LifecycleEngine::new(
        store,
        Arc::new(signer),
        provider,
        Arc::new(IncidentLog::new(100)),
        Arc::new(MonotonicClock::new()),
        config,
    ))
}

/// In-memory store that fails a configurable number of upcoming reads and
/// swaps with a pool timeout, as a Postgres store does under load.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryJobStore,
    failing_gets: AtomicUsize,
    failing_swaps: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    pub fn fail_swaps(&self, n: usize) {
        self.failing_swaps.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        self.inner.create(new_job).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        if Self::take(&self.failing_gets) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.get(job_id).await
    }

    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        expected_version: u64,
        mutator: Mutator,
    ) -> Result<Job, StoreError> {
        if Self::take(&self.failing_swaps) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner
            .compare_and_swap(job_id, expected_version, mutator)
            .await
    }

    async fn list_by_state(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError> {
        self.inner.list_by_state(states).await
    }
}

pub fn app_state(engine: Arc<LifecycleEngine>, verify_callback_signatures: bool) -> AppState {
    AppState::new(
        engine,
        poller_config(),
        PartnerSettings {
            partner_id: PARTNER_ID.to_string(),
            api_key: API_KEY.to_string(),
            environment: if verify_callback_signatures {
                Environment::Production
            } else {
                Environment::Sandbox
            },
            verify_callback_signatures,
        },
    )
}

pub fn evidence() -> Evidence {
    Evidence {
        images: vec![EvidenceImage {
            image: "aGVsbG8=".to_string(),
            image_type_id: "2".to_string(),
        }],
        id_info: None,
        meta: None,
    }
}

/// Drive a fresh job for `user_id` to SUBMITTED.
pub async fn submitted_job(engine: &LifecycleEngine, user_id: &str, product: Product) -> Job {
    let job = engine
        .create_job(JobRequest::new(product).user(user_id))
        .await
        .unwrap();
    engine.issue_token(job.job_id).await.unwrap();
    engine.submit(job.job_id, evidence()).await.unwrap()
}

pub fn callback_json(user_id: &str, job_id: Uuid, code: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "job_id": job_id.to_string(),
        "ResultCode": code,
        "ResultText": "Enroll User",
        "ConfidenceValue": "99",
        "Actions": { "Liveness_Check": "Passed" },
        "timestamp": "2026-01-01T00:00:00.000Z",
        "signature": "ignored",
    })
}
