// medi-coordinator - Multi-Agent Hospital Coordination Engine
// This exposes the core components for testing and integration

pub mod agent;
pub mod audit;
pub mod case;
pub mod config;
pub mod coordination;
pub mod metrics;
pub mod telemetry;

// Re-export key types for easy access
pub use agent::{AgentAdapter, AgentInvocationError, AgentRegistry, CapabilityProvider, ProviderError};
pub use audit::{AuditSink, DecisionStore, InMemoryAuditSink, TracingAuditSink};
pub use case::{AppliedDecision, CaseSnapshot, CaseStore, CaseStoreError, InMemoryCaseStore};
pub use config::{config, MediCoordinatorConfig, ObservabilityConfig};
pub use coordination::{
    Conflict, ConflictClass, ConflictResolver, CoordinationRequest, Decision, DecisionCommitter,
    DecisionKind, FailureCause, FailureReason, Finding, OrchestrationSupervisor, RequestPhase,
    ResolutionStatus, SchedulerConfig, SchedulingError, Severity, StateMutation, Task,
    TaskFailure, TaskScheduler, TaskStatus, Verdict, VerdictSet,
};
pub use metrics::{CoordinationSummary, MetricsTracker};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry};
