//! Background sweep over jobs no poll task is looking after: expires stale
//! TOKEN_ISSUED/SUBMITTED jobs and finalizes results left half-applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::engine::{EngineError, LifecycleEngine};
use crate::models::job::JobState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub finalized: usize,
    pub errors: usize,
}

/// One pass. Per-job failures are logged and counted, never propagated.
pub async fn sweep_once(
    engine: &LifecycleEngine,
    now: DateTime<Utc>,
) -> Result<SweepReport, EngineError> {
    let mut report = SweepReport::default();

    let waiting = engine
        .store()
        .list_by_state(&[JobState::TokenIssued, JobState::Submitted])
        .await?;
    for job in waiting {
        match engine.check_expiry(job.job_id, now).await {
            Ok(after) if after.state == JobState::Expired => report.expired += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Sweep expiry check failed");
                report.errors += 1;
            }
        }
    }

    let grace = chrono::Duration::from_std(engine.config().reconcile_grace)
        .unwrap_or_else(|_| chrono::Duration::seconds(5));
    let unsettled = engine
        .store()
        .list_by_state(&[JobState::CallbackReceived, JobState::PollConfirmed])
        .await?;
    for job in unsettled {
        // poll outcomes stay open to a superseding callback until the grace window closes
        if job.state == JobState::PollConfirmed && now < job.last_transition_at + grace {
            continue;
        }
        match engine.finalize(job.job_id).await {
            Ok(after) if after.state.is_terminal() => report.finalized += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Sweep finalize failed");
                report.errors += 1;
            }
        }
    }

    if report != SweepReport::default() {
        tracing::info!(
            expired = report.expired,
            finalized = report.finalized,
            errors = report.errors,
            "Sweep complete"
        );
    }
    Ok(report)
}

/// Sweep forever at `interval`.
pub async fn run_sweeper(engine: Arc<LifecycleEngine>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&engine, engine.now()).await {
            tracing::error!(error = %e, "Sweep failed, will retry");
        }
    }
}
