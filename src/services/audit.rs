//! In-process operator channel: recent callbacks and reconciliation incidents.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Fixed-capacity log that drops its oldest entry when full.
pub struct BoundedLog<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Newest last.
    pub fn snapshot(&self) -> Vec<T> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Terminal job received a callback with different content.
    InconsistentCallback,
    /// Poll and callback disagreed; the callback outcome was kept.
    ReconciliationConflict,
    /// Callback could not be matched to a job.
    UnroutableCallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub at: DateTime<Utc>,
    pub kind: IncidentKind,
    pub job_id: Option<Uuid>,
    pub detail: String,
}

pub type IncidentLog = BoundedLog<Incident>;

impl BoundedLog<Incident> {
    pub fn record(&self, kind: IncidentKind, job_id: Option<Uuid>, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!(
            kind = ?kind,
            job_id = ?job_id,
            detail = %detail,
            "Operator incident recorded"
        );
        metrics::counter!("kyc_incidents_total", "kind" => kind_label(kind)).increment(1);
        self.push(Incident {
            at: Utc::now(),
            kind,
            job_id,
            detail,
        });
    }
}

fn kind_label(kind: IncidentKind) -> &'static str {
    match kind {
        IncidentKind::InconsistentCallback => "inconsistent_callback",
        IncidentKind::ReconciliationConflict => "reconciliation_conflict",
        IncidentKind::UnroutableCallback => "unroutable_callback",
    }
}

/// A callback as received, kept for debugging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedCallback {
    pub received_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub job_id: Option<String>,
    pub result_code: Option<String>,
    pub processed: bool,
    pub body: serde_json::Value,
}

pub type RecentCallbacks = BoundedLog<ReceivedCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_log_drops_oldest() {
        let log = BoundedLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.snapshot(), vec![2, 3, 4]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_incident_record() {
        let log = IncidentLog::new(10);
        let id = Uuid::new_v4();
        log.record(IncidentKind::InconsistentCallback, Some(id), "code 0000 vs 1001");
        let incidents = log.snapshot();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, IncidentKind::InconsistentCallback);
        assert_eq!(incidents[0].job_id, Some(id));
    }
}
