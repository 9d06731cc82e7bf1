// Agent Adapter - uniform capability wrapper around domain agents
// Normalizes invocation, deadline enforcement, and the failure taxonomy so
// the scheduler never branches on agent-specific error types

pub mod builtin;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::case::CaseSnapshot;
use crate::coordination::types::{Finding, Task, Verdict};

/// Fixed failure taxonomy every adapter translates into.
#[derive(Debug, Error)]
pub enum AgentInvocationError {
    #[error("agent timed out on {capability} after {deadline_ms}ms")]
    Timeout { capability: String, deadline_ms: u64 },
    #[error("agent unavailable for {capability}: {detail}")]
    Unavailable { capability: String, detail: String },
    #[error("agent error on {capability}: {detail}")]
    Agent { capability: String, detail: String },
}

/// Agent-side failure, before the adapter stamps on the capability name and
/// applies the deadline cutoff.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// The capability interface every domain agent plugs in through. Providers
/// read the snapshot they are handed and must not mutate shared state; all
/// mutation goes through proposals on the returned finding.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn invoke(
        &self,
        snapshot: &CaseSnapshot,
        input: &serde_json::Value,
    ) -> Result<Finding, ProviderError>;
}

/// Deadline-enforcing wrapper around one registered provider.
#[derive(Clone)]
pub struct AgentAdapter {
    capability: String,
    provider: Arc<dyn CapabilityProvider>,
}

impl AgentAdapter {
    pub fn new(capability: impl Into<String>, provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            capability: capability.into(),
            provider,
        }
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Invoke the wrapped agent with a hard local cutoff at the task
    /// deadline. The resulting verdict is stamped with the snapshot version
    /// it was computed against, for staleness detection downstream.
    pub async fn invoke(
        &self,
        task: &Task,
        snapshot: &CaseSnapshot,
    ) -> Result<Verdict, AgentInvocationError> {
        let outcome = tokio::time::timeout(task.deadline, self.provider.invoke(snapshot, &task.input));

        match outcome.await {
            Err(_elapsed) => Err(AgentInvocationError::Timeout {
                capability: self.capability.clone(),
                deadline_ms: task.deadline.as_millis() as u64,
            }),
            Ok(Err(ProviderError::Unavailable(detail))) => Err(AgentInvocationError::Unavailable {
                capability: self.capability.clone(),
                detail,
            }),
            Ok(Err(ProviderError::Failed(detail))) => Err(AgentInvocationError::Agent {
                capability: self.capability.clone(),
                detail,
            }),
            Ok(Ok(finding)) => Ok(Verdict {
                verdict_id: Uuid::new_v4(),
                task_id: task.task_id,
                capability: self.capability.clone(),
                finding,
                case_version: snapshot.version,
                computed_at: Utc::now(),
            }),
        }
    }
}

struct RegisteredCapability {
    adapter: AgentAdapter,
    safety_relevant: bool,
}

/// Lookup table of capability name -> provider. Heterogeneous agents plug
/// in here; the scheduler and resolver never special-case agent types.
#[derive(Default)]
pub struct AgentRegistry {
    capabilities: HashMap<String, RegisteredCapability>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        capability: impl Into<String>,
        safety_relevant: bool,
        provider: Arc<dyn CapabilityProvider>,
    ) {
        let capability = capability.into();
        tracing::info!(
            capability = %capability,
            safety_relevant,
            "Capability registered"
        );
        self.capabilities.insert(
            capability.clone(),
            RegisteredCapability {
                adapter: AgentAdapter::new(capability, provider),
                safety_relevant,
            },
        );
    }

    pub fn adapter(&self, capability: &str) -> Option<AgentAdapter> {
        self.capabilities
            .get(capability)
            .map(|c| c.adapter.clone())
    }

    /// Safety-relevant capabilities turn a missing verdict into a blocking
    /// condition instead of an ignorable gap.
    pub fn is_safety_relevant(&self, capability: &str) -> bool {
        self.capabilities
            .get(capability)
            .map(|c| c.safety_relevant)
            .unwrap_or(false)
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.capabilities.contains_key(capability)
    }

    pub fn capability_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::types::Severity;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct FixedAgent {
        finding: Finding,
    }

    #[async_trait]
    impl CapabilityProvider for FixedAgent {
        async fn invoke(
            &self,
            _snapshot: &CaseSnapshot,
            _input: &serde_json::Value,
        ) -> Result<Finding, ProviderError> {
            Ok(self.finding.clone())
        }
    }

    struct StalledAgent;

    #[async_trait]
    impl CapabilityProvider for StalledAgent {
        async fn invoke(
            &self,
            _snapshot: &CaseSnapshot,
            _input: &serde_json::Value,
        ) -> Result<Finding, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Finding::info("never reached"))
        }
    }

    struct DownAgent;

    #[async_trait]
    impl CapabilityProvider for DownAgent {
        async fn invoke(
            &self,
            _snapshot: &CaseSnapshot,
            _input: &serde_json::Value,
        ) -> Result<Finding, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".to_string()))
        }
    }

    fn snapshot(version: u64) -> CaseSnapshot {
        CaseSnapshot {
            case_id: "case-1".to_string(),
            version,
            values: BTreeMap::new(),
        }
    }

    fn task(deadline: Duration) -> Task {
        Task::new("case-1", "pharmacy-check", serde_json::Value::Null, deadline)
    }

    #[tokio::test]
    async fn adapter_stamps_verdict_with_snapshot_version() {
        let adapter = AgentAdapter::new(
            "pharmacy-check",
            Arc::new(FixedAgent {
                finding: Finding::info("no interactions"),
            }),
        );

        let verdict = adapter
            .invoke(&task(Duration::from_secs(1)), &snapshot(4))
            .await
            .unwrap();

        assert_eq!(verdict.case_version, 4);
        assert_eq!(verdict.capability, "pharmacy-check");
        assert_eq!(verdict.finding.severity, Severity::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn adapter_enforces_hard_deadline() {
        let adapter = AgentAdapter::new("supply-check", Arc::new(StalledAgent));

        let err = adapter
            .invoke(&task(Duration::from_millis(50)), &snapshot(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentInvocationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn adapter_translates_provider_failures() {
        let adapter = AgentAdapter::new("supply-check", Arc::new(DownAgent));

        let err = adapter
            .invoke(&task(Duration::from_secs(1)), &snapshot(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentInvocationError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn registry_tracks_safety_relevance() {
        let mut registry = AgentRegistry::new();
        registry.register(
            "pharmacy-check",
            true,
            Arc::new(FixedAgent {
                finding: Finding::info("ok"),
            }),
        );
        registry.register(
            "discharge-check",
            false,
            Arc::new(FixedAgent {
                finding: Finding::info("ok"),
            }),
        );

        assert!(registry.is_safety_relevant("pharmacy-check"));
        assert!(!registry.is_safety_relevant("discharge-check"));
        assert!(!registry.is_safety_relevant("unknown"));
        assert!(registry.adapter("pharmacy-check").is_some());
        assert!(registry.adapter("unknown").is_none());
    }
}
