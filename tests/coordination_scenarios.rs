// End-to-end coordination scenarios
// Each test drives a full request through supervisor -> scheduler ->
// resolver -> committer against the in-memory case store

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use medi_coordinator::agent::builtin::{DischargeAgent, PharmacyAgent, SupplyAgent};
use medi_coordinator::agent::{AgentRegistry, CapabilityProvider, ProviderError};
use medi_coordinator::case::{CaseSnapshot, CaseStore, InMemoryCaseStore};
use medi_coordinator::coordination::types::Finding;
use medi_coordinator::{
    ConflictClass, CoordinationRequest, DecisionKind, FailureReason, InMemoryAuditSink,
    OrchestrationSupervisor, SchedulerConfig,
};

struct Scripted {
    finding: Finding,
    delay: Duration,
}

impl Scripted {
    fn new(finding: Finding) -> Arc<Self> {
        Arc::new(Self {
            finding,
            delay: Duration::ZERO,
        })
    }

    fn stalled() -> Arc<Self> {
        Arc::new(Self {
            finding: Finding::info("unreachable"),
            delay: Duration::from_secs(3600),
        })
    }
}

#[async_trait]
impl CapabilityProvider for Scripted {
    async fn invoke(
        &self,
        _snapshot: &CaseSnapshot,
        _input: &serde_json::Value,
    ) -> Result<Finding, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.finding.clone())
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_retries: 1,
        backoff_base_ms: 1,
        backoff_cap_ms: 2,
        task_deadline: Duration::from_millis(250),
    }
}

fn discharge_request(case_id: &str) -> CoordinationRequest {
    CoordinationRequest::new(
        case_id,
        &["pharmacy-check", "supply-check", "discharge-check"],
    )
    .depends_on("discharge-check", &["pharmacy-check", "supply-check"])
    .with_deadline(Duration::from_secs(10))
}

async fn store_with_case(values: &[(&str, serde_json::Value)]) -> Arc<InMemoryCaseStore> {
    let store = Arc::new(InMemoryCaseStore::new());
    let mut map = BTreeMap::new();
    for (k, v) in values {
        map.insert(k.to_string(), v.clone());
    }
    store.open_case("case-1", map).await;
    store
}

#[tokio::test]
async fn clean_discharge_request_completes_and_advances_state() {
    // GIVEN: case v1 with no active medications and stocked supplies
    let store = store_with_case(&[
        ("active-medications", json!([])),
        ("required-supplies", json!(["iv_fluids"])),
        ("inventory", json!({"iv_fluids": 200})),
    ])
    .await;
    let mut registry = AgentRegistry::new();
    registry.register("pharmacy-check", true, Arc::new(PharmacyAgent::new()));
    registry.register("supply-check", true, Arc::new(SupplyAgent::new()));
    registry.register("discharge-check", false, Arc::new(DischargeAgent::new()));
    let audit = Arc::new(InMemoryAuditSink::new());
    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        Arc::clone(&store) as Arc<dyn CaseStore>,
        fast_config(),
        Arc::clone(&audit) as _,
    );

    // WHEN: the full capability graph runs
    let decision = supervisor.coordinate(discharge_request("case-1")).await;

    // THEN: completed, state advanced to v2 with discharge-approved set
    match &decision.kind {
        DecisionKind::Completed {
            new_version,
            applied,
            ..
        } => {
            assert_eq!(*new_version, 2);
            assert_eq!(applied["discharge-approved"], json!(true));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    let snapshot = store.read("case-1").await.unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.get("discharge-approved"), Some(&json!(true)));

    // Audit completeness: all three verdicts on the decision, one event
    assert_eq!(decision.verdicts.len(), 3);
    assert!(decision.failures.is_empty());
    assert_eq!(audit.events().await.len(), 1);
}

#[tokio::test]
async fn blocking_interaction_escalates_and_never_commits() {
    // GIVEN: pharmacy will flag warfarin+aspirin while discharge
    // independently proposes release
    let store = store_with_case(&[
        ("active-medications", json!(["warfarin", "aspirin"])),
        ("required-supplies", json!([])),
    ])
    .await;
    let mut registry = AgentRegistry::new();
    registry.register("pharmacy-check", true, Arc::new(PharmacyAgent::new()));
    registry.register("supply-check", true, Arc::new(SupplyAgent::new()));
    // Independent discharge proposal, no dependency edge this time
    registry.register(
        "discharge-check",
        false,
        Scripted::new(Finding::info("ready").with_proposal("discharge-approved", json!(true))),
    );
    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        Arc::clone(&store) as Arc<dyn CaseStore>,
        fast_config(),
        Arc::new(InMemoryAuditSink::new()),
    );

    let request = CoordinationRequest::new(
        "case-1",
        &["pharmacy-check", "supply-check", "discharge-check"],
    )
    .with_deadline(Duration::from_secs(10));
    let decision = supervisor.coordinate(request).await;

    // THEN: escalated with a safety-violation conflict, state still v1
    match &decision.kind {
        DecisionKind::Escalated { conflicts } => {
            assert!(conflicts
                .iter()
                .any(|c| c.class == ConflictClass::SafetyViolation));
        }
        other => panic!("expected Escalated, got {other:?}"),
    }
    let snapshot = store.read("case-1").await.unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.get("discharge-approved"), None);
}

#[tokio::test]
async fn unresponsive_safety_relevant_agent_escalates_as_gap() {
    // GIVEN: supply-check flagged safety-relevant but never answers
    let store = store_with_case(&[("active-medications", json!([]))]).await;
    let mut registry = AgentRegistry::new();
    registry.register("pharmacy-check", true, Arc::new(PharmacyAgent::new()));
    registry.register("supply-check", true, Scripted::stalled());
    registry.register("discharge-check", false, Arc::new(DischargeAgent::new()));
    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        Arc::clone(&store) as Arc<dyn CaseStore>,
        fast_config(),
        Arc::new(InMemoryAuditSink::new()),
    );

    let decision = supervisor.coordinate(discharge_request("case-1")).await;

    // THEN: escalated on the missing verdict, state unchanged
    match &decision.kind {
        DecisionKind::Escalated { conflicts } => {
            assert!(conflicts.iter().any(|c| {
                c.class == ConflictClass::SafetyViolation && c.detail.contains("supply-check")
            }));
        }
        other => panic!("expected Escalated, got {other:?}"),
    }
    // The timeout is on the record as a failure marker, and the dependent
    // discharge task was blocked rather than silently skipped
    assert!(decision.failures.iter().any(|f| {
        f.capability == "supply-check" && matches!(f.reason, FailureReason::TimedOut)
    }));
    assert!(decision.failures.iter().any(|f| {
        f.capability == "discharge-check"
            && matches!(f.reason, FailureReason::Blocked { ref dependency } if dependency == "supply-check")
    }));
    assert_eq!(store.read("case-1").await.unwrap().version, 1);
}

#[tokio::test]
async fn blocking_verdict_is_never_completed_over() {
    // Property: whenever any verdict is blocking, the outcome is never
    // Completed with the contradicting proposal applied
    let store = store_with_case(&[("active-medications", json!([]))]).await;
    let mut registry = AgentRegistry::new();
    registry.register(
        "pharmacy-check",
        true,
        Scripted::new(Finding::blocking("interaction detected")),
    );
    registry.register(
        "discharge-check",
        false,
        Scripted::new(Finding::info("ready").with_proposal("discharge-approved", json!(true))),
    );
    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        Arc::clone(&store) as Arc<dyn CaseStore>,
        fast_config(),
        Arc::new(InMemoryAuditSink::new()),
    );

    let request = CoordinationRequest::new("case-1", &["pharmacy-check", "discharge-check"])
        .with_deadline(Duration::from_secs(10));
    let decision = supervisor.coordinate(request).await;

    assert!(decision.is_escalated());
    assert_eq!(
        store.read("case-1").await.unwrap().get("discharge-approved"),
        None
    );
}

#[tokio::test]
async fn stale_noop_verdict_is_tolerated_when_state_moves_mid_request() {
    // GIVEN: a pharmacy agent whose run overlaps an out-of-band commit to
    // the same case, so its verdict is computed against a superseded
    // version but proposes nothing
    struct OverlappingWriter {
        store: Arc<InMemoryCaseStore>,
    }

    #[async_trait]
    impl CapabilityProvider for OverlappingWriter {
        async fn invoke(
            &self,
            snapshot: &CaseSnapshot,
            _input: &serde_json::Value,
        ) -> Result<Finding, ProviderError> {
            // Another request commits while this agent is thinking
            let mut mutation = BTreeMap::new();
            mutation.insert("lab-results".to_string(), json!("posted"));
            self.store
                .commit(&snapshot.case_id, snapshot.version, &mutation, uuid::Uuid::new_v4())
                .await
                .map_err(|e| ProviderError::Failed(e.to_string()))?;
            Ok(Finding::info("no interactions"))
        }
    }

    let store = store_with_case(&[("active-medications", json!([]))]).await;
    let mut registry = AgentRegistry::new();
    registry.register(
        "pharmacy-check",
        true,
        Arc::new(OverlappingWriter {
            store: Arc::clone(&store),
        }),
    );
    // discharge runs after pharmacy, so it snapshots the newer version
    registry.register("discharge-check", false, Arc::new(DischargeAgent::new()));
    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        Arc::clone(&store) as Arc<dyn CaseStore>,
        fast_config(),
        Arc::new(InMemoryAuditSink::new()),
    );

    let request = CoordinationRequest::new("case-1", &["pharmacy-check", "discharge-check"])
        .depends_on("discharge-check", &["pharmacy-check"])
        .with_deadline(Duration::from_secs(10));
    let decision = supervisor.coordinate(request).await;

    // The stale no-op pharmacy verdict is excluded; the current-version
    // discharge proposal still commits, v2 -> v3, and the exclusion is on
    // the decision's audit record
    match &decision.kind {
        DecisionKind::Completed {
            new_version,
            applied,
            auto_resolved,
        } => {
            assert_eq!(*new_version, 3);
            assert_eq!(applied["discharge-approved"], json!(true));
            assert!(auto_resolved
                .iter()
                .any(|c| c.class == ConflictClass::Staleness));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_proposal_escalates_instead_of_committing() {
    // Same overlap, but now the overlapping agent also proposes a
    // mutation, which can no longer be applied safely
    struct OverlappingProposer {
        store: Arc<InMemoryCaseStore>,
    }

    #[async_trait]
    impl CapabilityProvider for OverlappingProposer {
        async fn invoke(
            &self,
            snapshot: &CaseSnapshot,
            _input: &serde_json::Value,
        ) -> Result<Finding, ProviderError> {
            let mut mutation = BTreeMap::new();
            mutation.insert("lab-results".to_string(), json!("posted"));
            self.store
                .commit(&snapshot.case_id, snapshot.version, &mutation, uuid::Uuid::new_v4())
                .await
                .map_err(|e| ProviderError::Failed(e.to_string()))?;
            Ok(Finding::warning("needs review")
                .with_proposal("medication-review", json!("scheduled")))
        }
    }

    let store = store_with_case(&[]).await;
    let mut registry = AgentRegistry::new();
    registry.register(
        "pharmacy-check",
        true,
        Arc::new(OverlappingProposer {
            store: Arc::clone(&store),
        }),
    );
    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        Arc::clone(&store) as Arc<dyn CaseStore>,
        fast_config(),
        Arc::new(InMemoryAuditSink::new()),
    );

    let request = CoordinationRequest::new("case-1", &["pharmacy-check"])
        .with_deadline(Duration::from_secs(10));
    let decision = supervisor.coordinate(request).await;

    match &decision.kind {
        DecisionKind::Escalated { conflicts } => {
            assert!(conflicts.iter().any(|c| c.class == ConflictClass::Staleness));
        }
        other => panic!("expected Escalated, got {other:?}"),
    }
    // The stale proposal was never applied
    assert_eq!(
        store.read("case-1").await.unwrap().get("medication-review"),
        None
    );
}
