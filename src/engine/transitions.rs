//! The job state graph.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::job::{Job, JobState};

/// Every edge a job may take. Nothing else is ever written.
pub const EDGES: &[(JobState, JobState)] = &[
    (JobState::Created, JobState::TokenIssued),
    (JobState::TokenIssued, JobState::Submitted),
    (JobState::Submitted, JobState::CallbackReceived),
    (JobState::Submitted, JobState::PollConfirmed),
    // a callback supersedes a poll outcome still waiting for finalization
    (JobState::PollConfirmed, JobState::CallbackReceived),
    (JobState::CallbackReceived, JobState::Complete),
    (JobState::CallbackReceived, JobState::Failed),
    (JobState::PollConfirmed, JobState::Complete),
    (JobState::PollConfirmed, JobState::Failed),
    (JobState::TokenIssued, JobState::Expired),
    (JobState::Submitted, JobState::Expired),
];

pub fn is_allowed(from: JobState, to: JobState) -> bool {
    EDGES.contains(&(from, to))
}

/// States that age out after the configured max age.
pub fn expires(state: JobState) -> bool {
    matches!(state, JobState::TokenIssued | JobState::Submitted)
}

/// Moment a TOKEN_ISSUED/SUBMITTED job stops being valid.
pub fn expiry_at(job: &Job, max_age: Duration) -> Option<DateTime<Utc>> {
    if !expires(job.state) {
        return None;
    }
    let max_age = chrono::Duration::from_std(max_age).ok()?;
    job.last_transition_at.checked_add_signed(max_age)
}

/// Pure check against stored timestamps.
pub fn is_expired(job: &Job, now: DateTime<Utc>, max_age: Duration) -> bool {
    expiry_at(job, max_age).is_some_and(|at| now >= at)
}

/// Terminal state for a provider verdict.
pub fn finalized_state(success: bool) -> JobState {
    if success {
        JobState::Complete
    } else {
        JobState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{NewJob, Product};
    use uuid::Uuid;

    const ALL: [JobState; 8] = [
        JobState::Created,
        JobState::TokenIssued,
        JobState::Submitted,
        JobState::CallbackReceived,
        JobState::PollConfirmed,
        JobState::Complete,
        JobState::Failed,
        JobState::Expired,
    ];

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!is_allowed(from, to), "{from} -> {to} must not exist");
            }
        }
    }

    #[test]
    fn test_no_edge_returns_to_created() {
        for from in ALL {
            assert!(!is_allowed(from, JobState::Created));
        }
    }

    #[test]
    fn test_submit_requires_token() {
        assert!(is_allowed(JobState::TokenIssued, JobState::Submitted));
        assert!(!is_allowed(JobState::Created, JobState::Submitted));
    }

    #[test]
    fn test_expiry_only_from_waiting_states() {
        let job_at = |state| {
            let mut job = NewJob {
                job_id: None,
                user_id: "u".into(),
                product: Product::Smartselfie,
                callback_url: None,
                created_at: Utc::now(),
            }
            .into_job(Uuid::new_v4());
            job.state = state;
            job
        };
        let max_age = Duration::from_secs(60);
        for state in ALL {
            let job = job_at(state);
            let later = job.last_transition_at + chrono::Duration::seconds(61);
            assert_eq!(is_expired(&job, later, max_age), expires(state), "{state}");
            assert!(!is_expired(&job, job.last_transition_at, max_age));
        }
    }
}
