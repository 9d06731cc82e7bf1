// Decision Committer - the only writer of case state
// Commit is one atomic version transition; a stale target fails with
// VersionConflict and the caller re-runs the request. Escalations never
// touch case state.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::case::{CaseStore, CaseStoreError};
use crate::coordination::resolver::ResolvedVerdicts;
use crate::coordination::types::{
    Conflict, CoordinationRequest, Decision, DecisionKind, FailureCause, StateMutation, VerdictSet,
};

pub struct DecisionCommitter {
    store: Arc<dyn CaseStore>,
}

impl DecisionCommitter {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    /// Apply an auto-resolved verdict set as a single version transition.
    /// Returns a Failed decision carrying the version-conflict cause when
    /// the case moved under us; there is no silent retry here.
    pub async fn commit(
        &self,
        request: &CoordinationRequest,
        resolved: ResolvedVerdicts,
        collected: VerdictSet,
        correlation_id: &str,
    ) -> Result<Decision, CaseStoreError> {
        if resolved.mutations.is_empty() {
            // Nothing to apply; completing without a version transition
            // keeps concurrent requests from going stale over a no-op.
            info!(
                request_id = %request.request_id,
                case_id = %request.case_id,
                version = resolved.base_version,
                "Decision complete with no state mutation"
            );
            return Ok(Decision {
                request_id: request.request_id,
                case_id: request.case_id.clone(),
                correlation_id: correlation_id.to_string(),
                kind: DecisionKind::Completed {
                    new_version: resolved.base_version,
                    applied: StateMutation::new(),
                    auto_resolved: resolved.auto_resolved,
                },
                verdicts: collected.verdicts,
                failures: collected.failures,
                decided_at: Utc::now(),
            });
        }

        match self
            .store
            .commit(
                &request.case_id,
                resolved.base_version,
                &resolved.mutations,
                request.request_id,
            )
            .await
        {
            Ok(new_version) => {
                info!(
                    request_id = %request.request_id,
                    case_id = %request.case_id,
                    new_version,
                    "Decision committed"
                );
                Ok(Decision {
                    request_id: request.request_id,
                    case_id: request.case_id.clone(),
                    correlation_id: correlation_id.to_string(),
                    kind: DecisionKind::Completed {
                        new_version,
                        applied: resolved.mutations,
                        auto_resolved: resolved.auto_resolved,
                    },
                    verdicts: collected.verdicts,
                    failures: collected.failures,
                    decided_at: Utc::now(),
                })
            }
            Err(CaseStoreError::VersionConflict {
                expected, current, ..
            }) => {
                warn!(
                    request_id = %request.request_id,
                    case_id = %request.case_id,
                    expected,
                    current,
                    "Commit rejected, case mutated concurrently"
                );
                Ok(Decision {
                    request_id: request.request_id,
                    case_id: request.case_id.clone(),
                    correlation_id: correlation_id.to_string(),
                    kind: DecisionKind::Failed {
                        reason: FailureCause::VersionConflict { expected, current },
                    },
                    verdicts: collected.verdicts,
                    failures: collected.failures,
                    decided_at: Utc::now(),
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Record an escalation for human review. No state mutation.
    pub fn escalate(
        &self,
        request: &CoordinationRequest,
        conflicts: Vec<Conflict>,
        collected: VerdictSet,
        correlation_id: &str,
    ) -> Decision {
        info!(
            request_id = %request.request_id,
            case_id = %request.case_id,
            conflicts = conflicts.len(),
            "Escalating for human review"
        );
        Decision {
            request_id: request.request_id,
            case_id: request.case_id.clone(),
            correlation_id: correlation_id.to_string(),
            kind: DecisionKind::Escalated { conflicts },
            verdicts: collected.verdicts,
            failures: collected.failures,
            decided_at: Utc::now(),
        }
    }
}
