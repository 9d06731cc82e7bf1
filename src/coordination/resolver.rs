// Conflict Resolver - pairwise and state-relative verdict evaluation
// Order-independent: severity is the tie-break, never arrival order or
// agent priority. Safety violations are never auto-resolved.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::case::CaseSnapshot;
use crate::coordination::types::{
    Conflict, ConflictClass, ResolutionStatus, Severity, StateMutation, Verdict, VerdictSet,
};

/// A verdict set cleared for commit: one base version, one merged mutation.
#[derive(Debug, Clone)]
pub struct ResolvedVerdicts {
    pub base_version: u64,
    pub mutations: StateMutation,
    /// Conflicts resolved without escalation (stale no-op exclusions).
    pub auto_resolved: Vec<Conflict>,
}

#[derive(Debug)]
pub enum Resolution {
    Resolved(ResolvedVerdicts),
    Escalated { conflicts: Vec<Conflict> },
}

pub struct ConflictResolver {
    registry: Arc<AgentRegistry>,
}

impl ConflictResolver {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Evaluate one request's collected verdicts against each other and the
    /// current case state. Auto-resolve only when no contradictions, no
    /// blocking severities, and no safety-relevant gaps remain; otherwise
    /// escalate without committing anything.
    pub fn resolve(&self, set: &VerdictSet, current: &CaseSnapshot) -> Resolution {
        let mut escalated: Vec<Conflict> = Vec::new();
        let mut auto_resolved: Vec<Conflict> = Vec::new();

        // 1. Staleness: verdicts computed before the current version are
        // excluded from commit consideration. A stale proposal can no
        // longer be applied safely, so it escalates; a stale no-op verdict
        // is excluded and the conflict auto-resolves.
        let mut eligible: Vec<&Verdict> = Vec::new();
        for verdict in &set.verdicts {
            if verdict.case_version < current.version {
                let conflict = Conflict {
                    class: ConflictClass::Staleness,
                    status: if verdict.finding.proposal.is_some() {
                        ResolutionStatus::Escalated
                    } else {
                        ResolutionStatus::AutoResolved
                    },
                    verdict_ids: vec![verdict.verdict_id],
                    detail: format!(
                        "{} verdict computed against version {} but case is at {}",
                        verdict.capability, verdict.case_version, current.version
                    ),
                };
                match conflict.status {
                    ResolutionStatus::Escalated => escalated.push(conflict),
                    _ => auto_resolved.push(conflict),
                }
            } else {
                eligible.push(verdict);
            }
        }

        // 2. Safety: blocking severity overrides every lower-severity
        // proposal regardless of ordering.
        for verdict in &set.verdicts {
            if verdict.finding.severity == Severity::Blocking {
                let mut involved: Vec<Uuid> = vec![verdict.verdict_id];
                involved.extend(
                    set.verdicts
                        .iter()
                        .filter(|v| {
                            v.verdict_id != verdict.verdict_id && v.finding.proposal.is_some()
                        })
                        .map(|v| v.verdict_id),
                );
                escalated.push(Conflict {
                    class: ConflictClass::SafetyViolation,
                    status: ResolutionStatus::Escalated,
                    verdict_ids: involved,
                    detail: format!(
                        "blocking finding from {}: {}",
                        verdict.capability, verdict.finding.rationale
                    ),
                });
            }
        }

        // 3. Contradiction: two proposals writing different values to the
        // same key cannot both be applied.
        let mut by_key: BTreeMap<&str, Vec<(&Verdict, &serde_json::Value)>> = BTreeMap::new();
        for &verdict in &eligible {
            if let Some(proposal) = &verdict.finding.proposal {
                for (key, value) in proposal {
                    by_key.entry(key.as_str()).or_default().push((verdict, value));
                }
            }
        }
        for (key, entries) in &by_key {
            let contradicts = entries
                .iter()
                .any(|(_, value)| *value != entries[0].1);
            if contradicts {
                escalated.push(Conflict {
                    class: ConflictClass::Contradiction,
                    status: ResolutionStatus::Escalated,
                    verdict_ids: entries.iter().map(|(v, _)| v.verdict_id).collect(),
                    detail: format!("mutually exclusive proposals for key {key}"),
                });
            }
        }

        // 4. Missing verdict: a failed or blocked safety-relevant
        // capability is itself a blocking condition, not an ignorable gap.
        for failure in &set.failures {
            if self.registry.is_safety_relevant(&failure.capability) {
                escalated.push(Conflict {
                    class: ConflictClass::SafetyViolation,
                    status: ResolutionStatus::Escalated,
                    verdict_ids: Vec::new(),
                    detail: format!(
                        "missing verdict from safety-relevant capability {}",
                        failure.capability
                    ),
                });
            }
        }

        if !escalated.is_empty() {
            warn!(
                case_id = %current.case_id,
                conflicts = escalated.len(),
                "Unresolved conflicts, escalating"
            );
            return Resolution::Escalated {
                conflicts: escalated,
            };
        }

        let mut mutations = StateMutation::new();
        for verdict in &eligible {
            if let Some(proposal) = &verdict.finding.proposal {
                for (key, value) in proposal {
                    mutations.insert(key.clone(), value.clone());
                }
            }
        }

        info!(
            case_id = %current.case_id,
            base_version = current.version,
            keys = mutations.len(),
            "Verdict set auto-resolved"
        );
        Resolution::Resolved(ResolvedVerdicts {
            base_version: current.version,
            mutations,
            auto_resolved,
        })
    }
}
