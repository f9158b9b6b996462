//! Job Lifecycle Engine.
//!
//! Owns every state transition. Each operation reads the current record,
//! decides the next step as a pure function of it, and writes through the
//! store's compare-and-swap, re-reading on version conflicts. Callback and
//! poll deliveries for the same job are reconciled here: a callback always
//! wins over a poll outcome that has not been finalized yet.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::job::{Job, JobResult, JobState, NewJob, Product, UpdateSource};
use crate::models::provider::{CallbackPayload, Evidence, ProviderOutcome};
use crate::services::audit::{IncidentKind, IncidentLog};
use crate::services::clock::Clock;
use crate::services::deadline::Deadline;
use crate::services::provider::{Submission, VerificationProvider};
use crate::services::signer::{IssuedToken, Signer, SigningRequest};
use crate::store::{JobStore, Mutator, StoreError};

mod error;
pub mod retry;
pub mod transitions;

pub use error::EngineError;
pub use retry::CasRetry;

use transitions::{finalized_state, is_allowed, is_expired};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub token_timeout: Duration,
    pub submit_timeout: Duration,
    /// Max age of TOKEN_ISSUED/SUBMITTED jobs.
    pub max_age: Duration,
    /// Window in which a callback may still replace a poll outcome.
    pub reconcile_grace: Duration,
    pub cas_retry: CasRetry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_timeout: Duration::from_secs(15),
            submit_timeout: Duration::from_secs(30),
            max_age: Duration::from_secs(300),
            reconcile_grace: Duration::from_secs(5),
            cas_retry: CasRetry::default(),
        }
    }
}

/// Parameters for a new job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Caller-chosen id; generated when `None`.
    pub job_id: Option<Uuid>,
    /// Generated as `user_<millis>` when absent or blank.
    pub user_id: Option<String>,
    pub product: Product,
    pub callback_url: Option<String>,
}

impl JobRequest {
    pub fn new(product: Product) -> Self {
        Self {
            job_id: None,
            user_id: None,
            product,
            callback_url: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum CallbackDisposition {
    /// The callback drove the job to a terminal state.
    Applied(Job),
    /// Identical re-delivery; nothing changed.
    Duplicate(Job),
}

impl CallbackDisposition {
    pub fn job(&self) -> &Job {
        match self {
            CallbackDisposition::Applied(job) | CallbackDisposition::Duplicate(job) => job,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PollDisposition {
    /// Provider has no verdict yet.
    Pending(Job),
    /// Job moved to POLL_CONFIRMED; finalize after the grace window.
    Confirmed(Job),
    /// Job already left SUBMITTED; the poll outcome was discarded.
    Superseded(Job),
}

enum Step {
    Apply(Mutator),
    Keep,
}

struct Transition {
    before: Job,
    after: Job,
    applied: bool,
}

fn advance(
    to: JobState,
    source: UpdateSource,
    result: Option<JobResult>,
    at: DateTime<Utc>,
) -> Step {
    Step::Apply(Box::new(move |job: &mut Job| {
        job.state = to;
        job.update_source = source;
        job.result = result;
        job.last_transition_at = at;
    }))
}

fn ensure(job: &Job, to: JobState, operation: &'static str) -> Result<(), EngineError> {
    if is_allowed(job.state, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidState {
            job_id: job.job_id,
            state: job.state,
            operation,
        })
    }
}

pub struct LifecycleEngine {
    store: Arc<dyn JobStore>,
    signer: Arc<dyn Signer>,
    provider: Arc<dyn VerificationProvider>,
    incidents: Arc<IncidentLog>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        signer: Arc<dyn Signer>,
        provider: Arc<dyn VerificationProvider>,
        incidents: Arc<IncidentLog>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            signer,
            provider,
            incidents,
            clock,
            config,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn VerificationProvider> {
        &self.provider
    }

    pub fn incidents(&self) -> &Arc<IncidentLog> {
        &self.incidents
    }

    pub async fn job(&self, job_id: Uuid) -> Result<Job, EngineError> {
        Ok(self.store.get(job_id).await?)
    }

    /// Current record with lazy expiry applied.
    pub async fn status(&self, job_id: Uuid) -> Result<Job, EngineError> {
        self.check_expiry(job_id, self.now()).await
    }

    pub async fn create_job(&self, request: JobRequest) -> Result<Job, EngineError> {
        let now = self.now();
        let user_id = request
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("user_{}", now.timestamp_millis()));

        let job = self
            .store
            .create(NewJob {
                job_id: request.job_id,
                user_id,
                product: request.product,
                callback_url: request.callback_url,
                created_at: now,
            })
            .await?;

        metrics::counter!("kyc_jobs_created_total", "product" => job.product.as_str())
            .increment(1);
        tracing::info!(
            job_id = %job.job_id,
            user_id = %job.user_id,
            product = %job.product,
            "Job created"
        );
        Ok(job)
    }

    /// CREATED -> TOKEN_ISSUED. The job is untouched if the signer fails or
    /// misses its deadline.
    pub async fn issue_token(&self, job_id: Uuid) -> Result<(Job, IssuedToken), EngineError> {
        let job = self.store.get(job_id).await?;
        ensure(&job, JobState::TokenIssued, "issue a token for")?;

        let request = SigningRequest::from(&job);
        let timeout = self.config.token_timeout;
        let deadline = Deadline::after(timeout);
        let started = Instant::now();

        let issued = match deadline.run(self.signer.issue_token(&request, deadline)).await {
            Ok(Ok(issued)) => issued,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Signer failed");
                metrics::counter!("kyc_external_failures_total", "call" => "token").increment(1);
                return Err(EngineError::TokenIssuance(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(job_id = %job_id, timeout_ms = timeout.as_millis() as u64, "Signer timed out");
                metrics::counter!("kyc_external_failures_total", "call" => "token").increment(1);
                return Err(EngineError::TokenIssuance(format!(
                    "signer did not respond within {}ms",
                    timeout.as_millis()
                )));
            }
        };
        metrics::histogram!("kyc_provider_call_seconds", "call" => "token")
            .record(started.elapsed().as_secs_f64());

        let now = self.now();
        let t = self
            .transition(job_id, |job| {
                ensure(job, JobState::TokenIssued, "issue a token for")?;
                Ok(advance(JobState::TokenIssued, UpdateSource::None, None, now))
            })
            .await?;

        Ok((t.after, issued))
    }

    /// TOKEN_ISSUED -> SUBMITTED once the provider accepts intake. Does not
    /// wait for the verdict.
    pub async fn submit(&self, job_id: Uuid, evidence: Evidence) -> Result<Job, EngineError> {
        let job = self.check_expiry(job_id, self.now()).await?;
        ensure(&job, JobState::Submitted, "submit")?;

        let submission = Submission {
            user_id: job.user_id.clone(),
            job_id,
            product: job.product,
            job_type: job.job_type,
            callback_url: job.callback_url.clone(),
            evidence,
        };
        let timeout = self.config.submit_timeout;
        let deadline = Deadline::after(timeout);
        let started = Instant::now();

        let receipt = match deadline.run(self.provider.submit(&submission, deadline)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Provider rejected submission");
                metrics::counter!("kyc_external_failures_total", "call" => "submit").increment(1);
                return Err(EngineError::Submission(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(job_id = %job_id, timeout_ms = timeout.as_millis() as u64, "Submission timed out");
                metrics::counter!("kyc_external_failures_total", "call" => "submit").increment(1);
                return Err(EngineError::Submission(format!(
                    "provider did not accept within {}ms",
                    timeout.as_millis()
                )));
            }
        };
        metrics::histogram!("kyc_provider_call_seconds", "call" => "submit")
            .record(started.elapsed().as_secs_f64());

        let now = self.now();
        let t = self
            .transition(job_id, |job| {
                ensure(job, JobState::Submitted, "submit")?;
                Ok(advance(JobState::Submitted, UpdateSource::None, None, now))
            })
            .await?;

        tracing::info!(
            job_id = %job_id,
            provider_job_id = ?receipt.provider_job_id,
            images = submission.evidence.images.len(),
            "Evidence submitted"
        );
        Ok(t.after)
    }

    /// Apply a provider callback. Identical re-delivery is a no-op; a
    /// differing payload for a settled job is recorded and rejected.
    pub async fn apply_callback(
        &self,
        job_id: Uuid,
        payload: &CallbackPayload,
    ) -> Result<CallbackDisposition, EngineError> {
        let incoming = payload.to_result();
        let now = self.now();

        let outcome = self
            .transition(job_id, |job| match job.state {
                JobState::Submitted | JobState::PollConfirmed => Ok(advance(
                    JobState::CallbackReceived,
                    UpdateSource::Callback,
                    Some(incoming.clone()),
                    now,
                )),
                JobState::CallbackReceived
                | JobState::Complete
                | JobState::Failed
                | JobState::Expired => {
                    if job.result.as_ref() == Some(&incoming) {
                        Ok(Step::Keep)
                    } else {
                        Err(EngineError::InconsistentCallback {
                            job_id,
                            state: job.state,
                        })
                    }
                }
                JobState::Created | JobState::TokenIssued => Err(EngineError::InvalidState {
                    job_id,
                    state: job.state,
                    operation: "apply a callback to",
                }),
            })
            .await;

        let t = match outcome {
            Ok(t) => t,
            Err(EngineError::InconsistentCallback { job_id, state }) => {
                let stored = self.store.get(job_id).await.ok().and_then(|j| j.result);
                self.incidents.record(
                    IncidentKind::InconsistentCallback,
                    Some(job_id),
                    format!(
                        "job is {state} with result {}; callback carried {}",
                        stored.as_ref().map_or("none", |r| r.result_code.as_str()),
                        incoming.result_code
                    ),
                );
                return Err(EngineError::InconsistentCallback { job_id, state });
            }
            Err(e) => return Err(e),
        };

        if !t.applied {
            tracing::info!(job_id = %job_id, state = %t.after.state, "Duplicate callback ignored");
            metrics::counter!("kyc_duplicate_callbacks_total").increment(1);
            let job = if t.after.state == JobState::CallbackReceived {
                self.finalize(job_id).await?
            } else {
                t.after
            };
            return Ok(CallbackDisposition::Duplicate(job));
        }

        if t.before.state == JobState::PollConfirmed && t.before.result.as_ref() != Some(&incoming)
        {
            self.incidents.record(
                IncidentKind::ReconciliationConflict,
                Some(job_id),
                format!(
                    "poll outcome {} discarded in favour of callback {}",
                    t.before.result.as_ref().map_or("none", |r| r.result_code.as_str()),
                    incoming.result_code
                ),
            );
        }

        let job = self.finalize(job_id).await?;
        Ok(CallbackDisposition::Applied(job))
    }

    /// Record a poll outcome. Only a SUBMITTED job accepts it; anything else
    /// means another channel got there first and the poll is discarded.
    pub async fn apply_poll_result(
        &self,
        job_id: Uuid,
        outcome: ProviderOutcome,
    ) -> Result<PollDisposition, EngineError> {
        let Some(incoming) = outcome.result().cloned() else {
            return Ok(PollDisposition::Pending(self.store.get(job_id).await?));
        };
        let now = self.now();

        let t = self
            .transition(job_id, |job| match job.state {
                JobState::Submitted => Ok(advance(
                    JobState::PollConfirmed,
                    UpdateSource::Poll,
                    Some(incoming.clone()),
                    now,
                )),
                _ => Ok(Step::Keep),
            })
            .await?;

        if t.applied {
            tracing::info!(
                job_id = %job_id,
                result_code = %incoming.result_code,
                "Poll outcome recorded, awaiting reconciliation window"
            );
            return Ok(PollDisposition::Confirmed(t.after));
        }

        let job = t.after;
        match &job.result {
            Some(existing) if existing != &incoming => {
                self.incidents.record(
                    IncidentKind::ReconciliationConflict,
                    Some(job_id),
                    format!(
                        "poll outcome {} discarded; job is {} via {} with {}",
                        incoming.result_code, job.state, job.update_source, existing.result_code
                    ),
                );
            }
            _ => {
                tracing::debug!(job_id = %job_id, state = %job.state, "Poll outcome superseded");
            }
        }
        Ok(PollDisposition::Superseded(job))
    }

    /// CALLBACK_RECEIVED/POLL_CONFIRMED -> COMPLETE/FAILED from the stored
    /// result code. Terminal jobs are returned unchanged.
    pub async fn finalize(&self, job_id: Uuid) -> Result<Job, EngineError> {
        let now = self.now();
        let t = self
            .transition(job_id, |job| match job.state {
                JobState::CallbackReceived | JobState::PollConfirmed => {
                    let result = job.result.clone().ok_or(EngineError::InvalidState {
                        job_id,
                        state: job.state,
                        operation: "finalize a result-less",
                    })?;
                    let to = finalized_state(result.success);
                    ensure(job, to, "finalize")?;
                    Ok(advance(to, job.update_source, Some(result), now))
                }
                state if state.is_terminal() => Ok(Step::Keep),
                state => Err(EngineError::InvalidState {
                    job_id,
                    state,
                    operation: "finalize",
                }),
            })
            .await?;

        if t.applied {
            let job = &t.after;
            tracing::info!(
                job_id = %job_id,
                state = %job.state,
                source = %job.update_source,
                result_code = job.result.as_ref().map(|r| r.result_code.as_str()),
                "Job finalized"
            );
            match job.state {
                JobState::Complete => metrics::counter!("kyc_jobs_completed").increment(1),
                _ => metrics::counter!("kyc_jobs_failed").increment(1),
            }
        }
        Ok(t.after)
    }

    /// TOKEN_ISSUED/SUBMITTED older than the max age -> EXPIRED.
    pub async fn check_expiry(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<Job, EngineError> {
        let max_age = self.config.max_age;
        let t = self
            .transition(job_id, |job| {
                if is_expired(job, now, max_age) {
                    Ok(advance(JobState::Expired, job.update_source, None, now))
                } else {
                    Ok(Step::Keep)
                }
            })
            .await?;

        if t.applied {
            tracing::info!(job_id = %job_id, from = %t.before.state, "Job expired");
            metrics::counter!("kyc_jobs_expired").increment(1);
        }
        Ok(t.after)
    }

    /// Read, plan, compare-and-swap; re-read on conflict up to the retry bound.
    async fn transition<F>(&self, job_id: Uuid, mut plan: F) -> Result<Transition, EngineError>
    where
        F: FnMut(&Job) -> Result<Step, EngineError> + Send,
    {
        let retry = &self.config.cas_retry;
        for attempt in 0..retry.max_attempts {
            let current = self.store.get(job_id).await?;
            let mutator = match plan(&current)? {
                Step::Keep => {
                    return Ok(Transition {
                        after: current.clone(),
                        before: current,
                        applied: false,
                    })
                }
                Step::Apply(mutator) => mutator,
            };

            match self
                .store
                .compare_and_swap(job_id, current.version, mutator)
                .await
            {
                Ok(after) => {
                    debug_assert!(is_allowed(current.state, after.state));
                    tracing::debug!(
                        job_id = %job_id,
                        from = %current.state,
                        to = %after.state,
                        version = after.version,
                        "Transition applied"
                    );
                    metrics::counter!("kyc_transitions_total", "to" => after.state.as_str())
                        .increment(1);
                    return Ok(Transition {
                        before: current,
                        after,
                        applied: true,
                    });
                }
                Err(StoreError::Conflict { actual, .. }) => {
                    tracing::debug!(
                        job_id = %job_id,
                        expected = current.version,
                        actual,
                        attempt,
                        "Version conflict, retrying"
                    );
                    metrics::counter!("kyc_cas_conflicts_total").increment(1);
                    if attempt + 1 < retry.max_attempts {
                        tokio::time::sleep(retry.delay(attempt)).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(job_id = %job_id, attempts = retry.max_attempts, "Gave up after repeated version conflicts");
        Err(EngineError::Conflict {
            job_id,
            attempts: retry.max_attempts,
        })
    }
}
