//! Reconciliation Poller.
//!
//! One task per SUBMITTED job queries the provider on a fixed cadence and
//! feeds outcomes into the lifecycle engine. The task ends as soon as the job
//! leaves SUBMITTED, whichever channel moved it, or when the job reaches its
//! max age, in which case it is expired. Store and engine failures short of
//! a missing job are logged and retried on the next tick.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::transitions::expiry_at;
use crate::engine::{EngineError, LifecycleEngine, PollDisposition};
use crate::models::job::JobState;
use crate::models::provider::ProviderOutcome;
use crate::services::deadline::Deadline;

pub mod sweep;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between status queries.
    pub interval: Duration,
    /// Deadline for a single status query.
    pub attempt_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// Another channel moved the job out of SUBMITTED.
    LeftSubmitted(JobState),
    /// The poll outcome was finalized into this state.
    Finalized(JobState),
    /// Ceiling reached; the job was expired.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub exit: PollExit,
    /// Status queries issued, including timed-out ones.
    pub attempts: u32,
}

pub struct ReconciliationPoller {
    engine: Arc<LifecycleEngine>,
    config: PollerConfig,
    active: Mutex<HashSet<Uuid>>,
}

/// Removes a job from the active set when its poll task ends.
struct ActiveGuard<'a> {
    active: &'a Mutex<HashSet<Uuid>>,
    job_id: Uuid,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.job_id);
    }
}

impl ReconciliationPoller {
    pub fn new(engine: Arc<LifecycleEngine>, config: PollerConfig) -> Self {
        Self {
            engine,
            config,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_polling(&self, job_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&job_id)
    }

    /// Start a background poll task unless one is already running for the
    /// job. Returns whether a task was started.
    pub fn spawn(self: &Arc<Self>, job_id: Uuid) -> bool {
        if !self.claim(job_id) {
            tracing::debug!(job_id = %job_id, "Poller already running");
            return false;
        }

        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = ActiveGuard {
                active: &poller.active,
                job_id,
            };
            match poller.poll_loop(job_id).await {
                Ok(report) => tracing::info!(
                    job_id = %job_id,
                    exit = ?report.exit,
                    attempts = report.attempts,
                    "Poller stopped"
                ),
                Err(e) => tracing::error!(job_id = %job_id, error = %e, "Poller aborted"),
            }
        });
        true
    }

    /// Run the poll loop to completion on the current task.
    pub async fn run(&self, job_id: Uuid) -> Result<PollReport, EngineError> {
        let claimed = self.claim(job_id);
        let _guard = claimed.then(|| ActiveGuard {
            active: &self.active,
            job_id,
        });
        self.poll_loop(job_id).await
    }

    fn claim(&self, job_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(job_id)
    }

    async fn poll_loop(&self, job_id: Uuid) -> Result<PollReport, EngineError> {
        let max_age = self.engine.config().max_age;
        let mut attempts = 0u32;
        let mut ceiling: Option<DateTime<Utc>> = None;

        loop {
            tokio::time::sleep(self.config.interval).await;

            let job = match self.engine.job(job_id).await {
                Ok(job) => job,
                Err(e) if gives_up(&e, ceiling, self.engine.now()) => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Job read failed, retrying next tick");
                    continue;
                }
            };
            if job.state != JobState::Submitted {
                return Ok(PollReport {
                    exit: PollExit::LeftSubmitted(job.state),
                    attempts,
                });
            }

            ceiling = expiry_at(&job, max_age);
            let now = self.engine.now();
            if ceiling.is_some_and(|at| now >= at) {
                let job = match self.engine.check_expiry(job_id, now).await {
                    Ok(job) => job,
                    // past the ceiling the sweeper owns the job
                    Err(e) => return Err(e),
                };
                let exit = match job.state {
                    JobState::Expired => PollExit::Expired,
                    other => PollExit::LeftSubmitted(other),
                };
                return Ok(PollReport { exit, attempts });
            }

            attempts += 1;
            metrics::counter!("kyc_poll_attempts_total").increment(1);

            let outcome = match self.query(&job.user_id, job_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, attempt = attempts, error = %e, "Status poll failed, retrying next tick");
                    continue;
                }
            };

            let disposition = match self.engine.apply_poll_result(job_id, outcome).await {
                Ok(disposition) => disposition,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, attempt = attempts, error = %e, "Recording poll outcome failed, retrying next tick");
                    continue;
                }
            };

            match disposition {
                PollDisposition::Pending(_) => {
                    tracing::debug!(job_id = %job_id, attempt = attempts, "Provider still processing");
                }
                PollDisposition::Confirmed(_) => {
                    let state = self.settle(job_id, ceiling).await?;
                    return Ok(PollReport {
                        exit: PollExit::Finalized(state),
                        attempts,
                    });
                }
                PollDisposition::Superseded(job) => {
                    return Ok(PollReport {
                        exit: PollExit::LeftSubmitted(job.state),
                        attempts,
                    });
                }
            }
        }
    }

    /// Wait out the grace window, then finalize, retrying each tick until the
    /// ceiling. Past it the sweeper owns the job.
    async fn settle(
        &self,
        job_id: Uuid,
        ceiling: Option<DateTime<Utc>>,
    ) -> Result<JobState, EngineError> {
        tokio::time::sleep(self.engine.config().reconcile_grace).await;
        loop {
            match self.engine.finalize(job_id).await {
                Ok(job) => return Ok(job.state),
                Err(e) if gives_up(&e, ceiling, self.engine.now()) => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Finalize failed, retrying next tick");
                    tokio::time::sleep(self.config.interval).await;
                }
            }
        }
    }

    /// One deadline-bound status query.
    async fn query(&self, user_id: &str, job_id: Uuid) -> Result<ProviderOutcome, EngineError> {
        let deadline = Deadline::after(self.config.attempt_timeout);
        let provider = self.engine.provider();
        match deadline.run(provider.job_status(user_id, job_id, deadline)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                metrics::counter!("kyc_external_failures_total", "call" => "status").increment(1);
                Err(EngineError::PollFailed(e.to_string()))
            }
            Err(_) => {
                metrics::counter!("kyc_external_failures_total", "call" => "status").increment(1);
                Err(EngineError::PollTimeout { job_id })
            }
        }
    }
}

/// Errors no later tick can fix.
fn is_fatal(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::NotFound(_) | EngineError::InvalidState { .. }
    )
}

fn gives_up(err: &EngineError, ceiling: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_fatal(err) || ceiling.is_some_and(|at| now >= at)
}
