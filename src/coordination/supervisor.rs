// Orchestration Supervisor - top-level control loop per request
// Drives scheduler -> resolver -> committer and guarantees exactly one
// durably recorded terminal outcome for every request

use chrono::Utc;
use statig::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, Instrument};
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::audit::{AuditSink, DecisionStore};
use crate::case::{CaseStore, CaseStoreError};
use crate::coordination::committer::DecisionCommitter;
use crate::coordination::lifecycle::{RequestEvent, RequestLifecycle};
use crate::coordination::resolver::{ConflictResolver, Resolution};
use crate::coordination::scheduler::{SchedulerConfig, SchedulingError, TaskScheduler};
use crate::coordination::types::{
    CoordinationRequest, Decision, DecisionKind, FailureCause, VerdictSet,
};
use crate::metrics::MetricsTracker;
use crate::telemetry::{create_coordination_span, generate_correlation_id};

pub struct OrchestrationSupervisor {
    store: Arc<dyn CaseStore>,
    scheduler: TaskScheduler,
    resolver: ConflictResolver,
    committer: DecisionCommitter,
    decisions: Arc<DecisionStore>,
    audit: Arc<dyn AuditSink>,
    metrics: MetricsTracker,
}

impl OrchestrationSupervisor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: Arc<dyn CaseStore>,
        config: SchedulerConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            scheduler: TaskScheduler::new(Arc::clone(&registry), Arc::clone(&store), config),
            resolver: ConflictResolver::new(registry),
            committer: DecisionCommitter::new(Arc::clone(&store)),
            store,
            decisions: Arc::new(DecisionStore::new()),
            audit,
            metrics: MetricsTracker::new(),
        }
    }

    /// Drive one coordination request to its terminal decision. Every
    /// request ends Completed, Escalated, or Failed; a request id that
    /// already reached a terminal decision gets that same decision back,
    /// never a recomputation.
    pub async fn coordinate(&self, request: CoordinationRequest) -> Decision {
        if let Some(existing) = self.decisions.get(request.request_id).await {
            tracing::debug!(
                request_id = %request.request_id,
                "Request already terminal, returning recorded decision"
            );
            return existing;
        }

        let correlation_id = generate_correlation_id();
        let span = create_coordination_span(
            "coordinate",
            &request.request_id.to_string(),
            &request.case_id,
            &correlation_id,
        );
        let started = Instant::now();

        let decision = self
            .run(&request, &correlation_id)
            .instrument(span)
            .await;

        // Durably record the terminal outcome before answering the caller;
        // the first record for a request id wins.
        let decision = self.decisions.record(decision).await;
        self.audit.publish(&decision).await;
        self.metrics.record(&decision, started.elapsed()).await;
        decision
    }

    /// Audit lookup for an already-terminal request.
    pub async fn decision(&self, request_id: Uuid) -> Option<Decision> {
        self.decisions.get(request_id).await
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    async fn run(&self, request: &CoordinationRequest, correlation_id: &str) -> Decision {
        let mut lifecycle = RequestLifecycle::new(request.request_id.to_string()).state_machine();

        // A request against a nonexistent case fails before any dispatch.
        if let Err(err) = self.store.read(&request.case_id).await {
            let cause = match err {
                CaseStoreError::CaseNotFound(case_id) => FailureCause::CaseNotFound { case_id },
                other => FailureCause::Internal {
                    detail: other.to_string(),
                },
            };
            lifecycle.handle(&RequestEvent::Fail {
                reason: cause.to_string(),
            });
            return self.failed(request, cause, VerdictSet::default(), correlation_id);
        }

        lifecycle.handle(&RequestEvent::BeginScheduling);
        let collected = match self.scheduler.execute(request).await {
            Ok(collected) => collected,
            Err(SchedulingError::GlobalDeadlineExceeded { collected, .. }) => {
                lifecycle.handle(&RequestEvent::Fail {
                    reason: "scheduling timeout".to_string(),
                });
                // Verdicts that completed before the deadline stay on the
                // record even though the request failed.
                return self.failed(
                    request,
                    FailureCause::SchedulingTimeout,
                    collected,
                    correlation_id,
                );
            }
            Err(err) => {
                error!(request_id = %request.request_id, error = %err, "Scheduling failed");
                lifecycle.handle(&RequestEvent::Fail {
                    reason: err.to_string(),
                });
                return self.failed(
                    request,
                    FailureCause::Internal {
                        detail: err.to_string(),
                    },
                    VerdictSet::default(),
                    correlation_id,
                );
            }
        };
        lifecycle.handle(&RequestEvent::VerdictsCollected {
            verdicts: collected.verdicts.len(),
            failures: collected.failures.len(),
        });

        // Resolve against the state as it is now, not as it was when the
        // request arrived; concurrent commits surface as staleness here.
        let current = match self.store.read(&request.case_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                lifecycle.handle(&RequestEvent::Fail {
                    reason: err.to_string(),
                });
                return self.failed(
                    request,
                    FailureCause::Internal {
                        detail: err.to_string(),
                    },
                    collected,
                    correlation_id,
                );
            }
        };

        match self.resolver.resolve(&collected, &current) {
            Resolution::Resolved(resolved) => {
                lifecycle.handle(&RequestEvent::AutoResolved);
                match self
                    .committer
                    .commit(request, resolved, collected.clone(), correlation_id)
                    .await
                {
                    Ok(decision) => {
                        match &decision.kind {
                            DecisionKind::Completed { new_version, .. } => {
                                lifecycle.handle(&RequestEvent::Committed {
                                    new_version: *new_version,
                                });
                            }
                            DecisionKind::Failed { reason } => {
                                lifecycle.handle(&RequestEvent::Fail {
                                    reason: reason.to_string(),
                                });
                            }
                            DecisionKind::Escalated { .. } => {}
                        }
                        decision
                    }
                    Err(err) => {
                        error!(request_id = %request.request_id, error = %err, "Commit failed");
                        lifecycle.handle(&RequestEvent::Fail {
                            reason: err.to_string(),
                        });
                        self.failed(
                            request,
                            FailureCause::Internal {
                                detail: err.to_string(),
                            },
                            collected,
                            correlation_id,
                        )
                    }
                }
            }
            Resolution::Escalated { conflicts } => {
                lifecycle.handle(&RequestEvent::Escalate {
                    conflicts: conflicts.len(),
                });
                self.committer
                    .escalate(request, conflicts, collected, correlation_id)
            }
        }
    }

    fn failed(
        &self,
        request: &CoordinationRequest,
        reason: FailureCause,
        collected: VerdictSet,
        correlation_id: &str,
    ) -> Decision {
        Decision {
            request_id: request.request_id,
            case_id: request.case_id.clone(),
            correlation_id: correlation_id.to_string(),
            kind: DecisionKind::Failed { reason },
            verdicts: collected.verdicts,
            failures: collected.failures,
            decided_at: Utc::now(),
        }
    }
}
