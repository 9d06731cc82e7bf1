// Shared data model for the coordination engine
// Cases are mutated only by the committer; agents propose mutations via Verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Domain-key mutation proposed or applied against case state.
/// Keys are stable strings ("discharge-approved", "medication-hold", ...).
pub type StateMutation = BTreeMap<String, serde_json::Value>;

/// Severity of an agent finding. Ordering matters: severity, not recency
/// or agent priority, is the tie-break during conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Blocking,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Blocking => write!(f, "blocking"),
        }
    }
}

/// The structured output of one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Proposed case-state mutation, if the agent wants one applied.
    pub proposal: Option<StateMutation>,
    pub rationale: String,
}

impl Finding {
    pub fn info(rationale: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            proposal: None,
            rationale: rationale.into(),
        }
    }

    pub fn warning(rationale: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            proposal: None,
            rationale: rationale.into(),
        }
    }

    pub fn blocking(rationale: impl Into<String>) -> Self {
        Self {
            severity: Severity::Blocking,
            proposal: None,
            rationale: rationale.into(),
        }
    }

    pub fn with_proposal(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.proposal
            .get_or_insert_with(StateMutation::new)
            .insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed,
    /// A dependency failed, so this task was never dispatched.
    Blocked,
}

/// One unit of work assigned to a single capability.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: Uuid,
    pub case_id: String,
    pub capability: String,
    pub input: serde_json::Value,
    pub deadline: Duration,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(
        case_id: impl Into<String>,
        capability: impl Into<String>,
        input: serde_json::Value,
        deadline: Duration,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            case_id: case_id.into(),
            capability: capability.into(),
            input,
            deadline,
            status: TaskStatus::Pending,
        }
    }
}

/// An agent's output for one task, stamped with the case-state version it
/// was computed against so staleness can be detected at resolution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub verdict_id: Uuid,
    pub task_id: Uuid,
    pub capability: String,
    pub finding: Finding,
    pub case_version: u64,
    pub computed_at: DateTime<Utc>,
}

/// Why a task produced no verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum FailureReason {
    TimedOut,
    Unavailable { detail: String },
    AgentError { detail: String },
    /// Dependency never completed, so the task was not dispatched.
    Blocked { dependency: String },
}

/// Marker for a task that terminated without a verdict. Surfaced to the
/// resolver as a missing-verdict condition, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: Uuid,
    pub capability: String,
    pub reason: FailureReason,
}

/// Everything the scheduler collected for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerdictSet {
    pub verdicts: Vec<Verdict>,
    pub failures: Vec<TaskFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictClass {
    Contradiction,
    Staleness,
    SafetyViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStatus {
    Unresolved,
    AutoResolved,
    Escalated,
}

/// A detected incompatibility between verdicts, or between a verdict and
/// current case state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub class: ConflictClass,
    pub status: ResolutionStatus,
    pub verdict_ids: Vec<Uuid>,
    pub detail: String,
}

/// Why a request terminated as Failed. Clinical conflicts never appear
/// here; those terminate as Escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum FailureCause {
    SchedulingTimeout,
    CaseNotFound { case_id: String },
    VersionConflict { expected: u64, current: u64 },
    Internal { detail: String },
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::SchedulingTimeout => write!(f, "global scheduling deadline exceeded"),
            FailureCause::CaseNotFound { case_id } => write!(f, "case not found: {case_id}"),
            FailureCause::VersionConflict { expected, current } => write!(
                f,
                "version conflict: committed against {expected}, case is at {current}"
            ),
            FailureCause::Internal { detail } => write!(f, "internal error: {detail}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum DecisionKind {
    /// State advanced by exactly one version transition, or left at the
    /// base version when the resolved set proposed no mutations.
    Completed {
        new_version: u64,
        applied: StateMutation,
        /// Conflicts resolved without escalation, kept for audit.
        auto_resolved: Vec<Conflict>,
    },
    /// Unresolved conflicts deferred to human review; state untouched.
    Escalated { conflicts: Vec<Conflict> },
    Failed { reason: FailureCause },
}

/// Terminal artifact for one coordination request. Always references the
/// full verdict and failure set for audit completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub request_id: Uuid,
    pub case_id: String,
    pub correlation_id: String,
    pub kind: DecisionKind,
    pub verdicts: Vec<Verdict>,
    pub failures: Vec<TaskFailure>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_completed(&self) -> bool {
        matches!(self.kind, DecisionKind::Completed { .. })
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self.kind, DecisionKind::Escalated { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, DecisionKind::Failed { .. })
    }
}

/// Incoming coordination request: which capabilities must weigh in on a
/// case, in what dependency order, and under what global deadline.
#[derive(Debug, Clone)]
pub struct CoordinationRequest {
    pub request_id: Uuid,
    pub case_id: String,
    pub capabilities: Vec<String>,
    /// capability -> capabilities that must complete first (acyclic)
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub deadline: Duration,
    pub input: serde_json::Value,
}

impl CoordinationRequest {
    pub fn new(case_id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            case_id: case_id.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            dependencies: BTreeMap::new(),
            deadline: Duration::from_secs(30),
            input: serde_json::Value::Null,
        }
    }

    pub fn depends_on(mut self, capability: &str, prerequisites: &[&str]) -> Self {
        self.dependencies.insert(
            capability.to_string(),
            prerequisites.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }
}
