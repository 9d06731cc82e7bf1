// Coordination outcome tracking
// In-process counters over terminal decisions, for the status output and
// operational visibility; external dashboards consume the audit sink

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::coordination::types::{Decision, DecisionKind};

#[derive(Debug, Default, Clone)]
struct MetricsInner {
    total_requests: u64,
    completed: u64,
    escalated: u64,
    failed: u64,
    total_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationSummary {
    pub total_requests: u64,
    pub completed: u64,
    pub escalated: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    pub escalation_rate: f64,
}

#[derive(Clone, Default)]
pub struct MetricsTracker {
    inner: Arc<Mutex<MetricsInner>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, decision: &Decision, duration: Duration) {
        let mut inner = self.inner.lock().await;
        inner.total_requests += 1;
        inner.total_duration_ms += duration.as_millis() as u64;
        match decision.kind {
            DecisionKind::Completed { .. } => inner.completed += 1,
            DecisionKind::Escalated { .. } => inner.escalated += 1,
            DecisionKind::Failed { .. } => inner.failed += 1,
        }
    }

    pub async fn summary(&self) -> CoordinationSummary {
        let inner = self.inner.lock().await;
        let total = inner.total_requests;
        CoordinationSummary {
            total_requests: total,
            completed: inner.completed,
            escalated: inner.escalated,
            failed: inner.failed,
            avg_duration_ms: if total == 0 {
                0.0
            } else {
                inner.total_duration_ms as f64 / total as f64
            },
            escalation_rate: if total == 0 {
                0.0
            } else {
                inner.escalated as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::types::FailureCause;
    use chrono::Utc;
    use uuid::Uuid;

    fn decision(kind: DecisionKind) -> Decision {
        Decision {
            request_id: Uuid::new_v4(),
            case_id: "case-1".to_string(),
            correlation_id: "corr".to_string(),
            kind,
            verdicts: Vec::new(),
            failures: Vec::new(),
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn summary_reflects_recorded_outcomes() {
        let tracker = MetricsTracker::new();
        tracker
            .record(
                &decision(DecisionKind::Completed {
                    new_version: 2,
                    applied: Default::default(),
                    auto_resolved: Vec::new(),
                }),
                Duration::from_millis(20),
            )
            .await;
        tracker
            .record(
                &decision(DecisionKind::Escalated {
                    conflicts: Vec::new(),
                }),
                Duration::from_millis(40),
            )
            .await;
        tracker
            .record(
                &decision(DecisionKind::Failed {
                    reason: FailureCause::SchedulingTimeout,
                }),
                Duration::from_millis(60),
            )
            .await;

        let summary = tracker.summary().await;
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.escalated, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.avg_duration_ms - 40.0).abs() < f64::EPSILON);
        assert!((summary.escalation_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_tracker_reports_zeroes() {
        let tracker = MetricsTracker::new();
        let summary = tracker.summary().await;
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.avg_duration_ms, 0.0);
    }
}
