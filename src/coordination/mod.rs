//! Agent orchestration and conflict-resolution core
//!
//! One coordination request flows Supervisor -> Scheduler (concurrent
//! agent tasks against a case snapshot) -> Conflict Resolver -> Decision
//! Committer, ending in exactly one terminal decision: Completed,
//! Escalated, or Failed. Escalation is always preferred over an unsafe
//! auto-commit.

pub mod committer;
pub mod lifecycle;
pub mod resolver;
pub mod scheduler;
pub mod supervisor;
pub mod types;

pub use committer::DecisionCommitter;
pub use lifecycle::{RequestEvent, RequestLifecycle, RequestPhase};
pub use resolver::{ConflictResolver, ResolvedVerdicts, Resolution};
pub use scheduler::{SchedulerConfig, SchedulingError, TaskScheduler};
pub use supervisor::OrchestrationSupervisor;
pub use types::{
    Conflict, ConflictClass, CoordinationRequest, Decision, DecisionKind, FailureCause,
    FailureReason, Finding, ResolutionStatus, Severity, StateMutation, Task, TaskFailure,
    TaskStatus, Verdict, VerdictSet,
};
