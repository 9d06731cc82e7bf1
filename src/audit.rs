// Audit/event sink and terminal-decision store
// One event per terminal decision, fire-and-forget; the decision store is
// the durable record the supervisor writes before returning to the caller

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::coordination::types::Decision;

/// Fire-and-forget consumer of terminal decisions. Implementations must
/// not fail the request path; delivery problems are theirs to log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn publish(&self, decision: &Decision);
}

/// Emits each terminal decision as a structured log event, the default
/// sink for deployments where notification systems tail the log stream.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn publish(&self, decision: &Decision) {
        let payload = serde_json::to_string(decision).unwrap_or_else(|e| {
            format!("{{\"serialization-error\":\"{e}\"}}")
        });
        info!(
            request_id = %decision.request_id,
            case_id = %decision.case_id,
            correlation_id = %decision.correlation_id,
            payload = %payload,
            "Terminal decision emitted"
        );
    }
}

/// Collects published decisions in memory; used by tests and the demo CLI.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: RwLock<Vec<Decision>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Decision> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn publish(&self, decision: &Decision) {
        self.events.write().await.push(decision.clone());
    }
}

/// Terminal decisions by request id. A recorded decision is immutable:
/// repeated lookups return the same artifact and it is never recomputed.
#[derive(Default)]
pub struct DecisionStore {
    decisions: RwLock<HashMap<Uuid, Decision>>,
}

impl DecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal decision. The first write wins; a second write
    /// for the same request id is ignored so no request can double-commit
    /// its audit record.
    pub async fn record(&self, decision: Decision) -> Decision {
        let mut decisions = self.decisions.write().await;
        decisions
            .entry(decision.request_id)
            .or_insert(decision)
            .clone()
    }

    pub async fn get(&self, request_id: Uuid) -> Option<Decision> {
        self.decisions.read().await.get(&request_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.decisions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.decisions.read().await.is_empty()
    }
}
