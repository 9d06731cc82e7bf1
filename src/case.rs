// Shared Case State Store - versioned per-case snapshots
// Read-shared by concurrent task snapshots, mutated single-writer through
// the committer under optimistic versioning (CAS on the version field)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::coordination::types::StateMutation;

#[derive(Debug, Error)]
pub enum CaseStoreError {
    #[error("case not found: {0}")]
    CaseNotFound(String),
    #[error("version conflict on case {case_id}: expected {expected}, current {current}")]
    VersionConflict {
        case_id: String,
        expected: u64,
        current: u64,
    },
}

/// Read-only view of a case at one version. Handed to agents as task input;
/// agents never see (or touch) the live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSnapshot {
    pub case_id: String,
    pub version: u64,
    pub values: BTreeMap<String, serde_json::Value>,
}

impl CaseSnapshot {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }
}

/// One committed version transition, kept on the case for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedDecision {
    pub request_id: Uuid,
    pub version: u64,
    pub mutations: StateMutation,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CaseState {
    version: u64,
    values: BTreeMap<String, serde_json::Value>,
    decision_log: Vec<AppliedDecision>,
}

/// Persistence seam for case state. Durable storage is an external concern;
/// the engine only relies on read-snapshot and compare-and-swap commit.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn read(&self, case_id: &str) -> Result<CaseSnapshot, CaseStoreError>;

    /// Atomically transition the case from `expected_version` to
    /// `expected_version + 1`, applying all mutations, or fail with
    /// `VersionConflict` without applying anything.
    async fn commit(
        &self,
        case_id: &str,
        expected_version: u64,
        mutations: &StateMutation,
        request_id: Uuid,
    ) -> Result<u64, CaseStoreError>;
}

/// In-memory store used by the binary and tests.
#[derive(Default)]
pub struct InMemoryCaseStore {
    cases: RwLock<HashMap<String, CaseState>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a case at version 1 with the given initial domain keys.
    pub async fn open_case(
        &self,
        case_id: impl Into<String>,
        initial: BTreeMap<String, serde_json::Value>,
    ) {
        let case_id = case_id.into();
        let mut cases = self.cases.write().await;
        cases.insert(
            case_id.clone(),
            CaseState {
                version: 1,
                values: initial,
                decision_log: Vec::new(),
            },
        );
        tracing::info!(case_id = %case_id, "Case opened at version 1");
    }

    /// Applied-decision history for one case, oldest first.
    pub async fn decision_log(&self, case_id: &str) -> Result<Vec<AppliedDecision>, CaseStoreError> {
        let cases = self.cases.read().await;
        cases
            .get(case_id)
            .map(|c| c.decision_log.clone())
            .ok_or_else(|| CaseStoreError::CaseNotFound(case_id.to_string()))
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn read(&self, case_id: &str) -> Result<CaseSnapshot, CaseStoreError> {
        let cases = self.cases.read().await;
        let case = cases
            .get(case_id)
            .ok_or_else(|| CaseStoreError::CaseNotFound(case_id.to_string()))?;
        Ok(CaseSnapshot {
            case_id: case_id.to_string(),
            version: case.version,
            values: case.values.clone(),
        })
    }

    async fn commit(
        &self,
        case_id: &str,
        expected_version: u64,
        mutations: &StateMutation,
        request_id: Uuid,
    ) -> Result<u64, CaseStoreError> {
        let mut cases = self.cases.write().await;
        let case = cases
            .get_mut(case_id)
            .ok_or_else(|| CaseStoreError::CaseNotFound(case_id.to_string()))?;

        if case.version != expected_version {
            return Err(CaseStoreError::VersionConflict {
                case_id: case_id.to_string(),
                expected: expected_version,
                current: case.version,
            });
        }

        for (key, value) in mutations {
            case.values.insert(key.clone(), value.clone());
        }
        case.version += 1;
        case.decision_log.push(AppliedDecision {
            request_id,
            version: case.version,
            mutations: mutations.clone(),
            applied_at: Utc::now(),
        });

        tracing::info!(
            case_id = %case_id,
            version = case.version,
            keys = mutations.len(),
            "Case state committed"
        );
        Ok(case.version)
    }
}
