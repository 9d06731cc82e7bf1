// Built-in rule-based capability providers
// Deterministic stand-ins for the external inference agents (pharmacy,
// supply, discharge) used by the demo binary and tests

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::agent::{AgentRegistry, CapabilityProvider, ProviderError};
use crate::case::CaseSnapshot;
use crate::config::MediCoordinatorConfig;
use crate::coordination::types::Finding;

/// Registry of the built-in providers, with each capability's
/// safety-relevance taken from the configured roster.
pub fn builtin_registry(config: &MediCoordinatorConfig) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(
        "pharmacy-check",
        config.is_safety_relevant("pharmacy-check"),
        Arc::new(PharmacyAgent::new()),
    );
    registry.register(
        "supply-check",
        config.is_safety_relevant("supply-check"),
        Arc::new(SupplyAgent::new()),
    );
    registry.register(
        "discharge-check",
        config.is_safety_relevant("discharge-check"),
        Arc::new(DischargeAgent::new()),
    );
    registry
}

fn string_list(snapshot: &CaseSnapshot, key: &str) -> Vec<String> {
    snapshot
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(|s| s.to_lowercase()))
                .collect()
        })
        .unwrap_or_default()
}

/// Pharmacy / drug-interaction checker. Flags known severe interaction
/// pairs among the case's active medications as blocking findings.
pub struct PharmacyAgent {
    interactions: Vec<(String, String)>,
}

impl Default for PharmacyAgent {
    fn default() -> Self {
        Self {
            interactions: vec![
                ("warfarin".to_string(), "aspirin".to_string()),
                ("methotrexate".to_string(), "ibuprofen".to_string()),
                ("sildenafil".to_string(), "nitroglycerin".to_string()),
            ],
        }
    }
}

impl PharmacyAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interactions(interactions: Vec<(String, String)>) -> Self {
        Self { interactions }
    }
}

#[async_trait]
impl CapabilityProvider for PharmacyAgent {
    async fn invoke(
        &self,
        snapshot: &CaseSnapshot,
        _input: &serde_json::Value,
    ) -> Result<Finding, ProviderError> {
        let medications = string_list(snapshot, "active-medications");

        for (a, b) in &self.interactions {
            if medications.contains(a) && medications.contains(b) {
                return Ok(Finding::blocking(format!(
                    "severe drug interaction: {a} with {b}"
                ))
                .with_proposal("medication-hold", json!("pending-review")));
            }
        }

        Ok(Finding::info(format!(
            "no interactions among {} active medications",
            medications.len()
        )))
    }
}

/// Supply-chain availability checker against the case's inventory keys.
pub struct SupplyAgent {
    low_stock_threshold: u64,
}

impl Default for SupplyAgent {
    fn default() -> Self {
        Self {
            low_stock_threshold: 10,
        }
    }
}

impl SupplyAgent {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapabilityProvider for SupplyAgent {
    async fn invoke(
        &self,
        snapshot: &CaseSnapshot,
        _input: &serde_json::Value,
    ) -> Result<Finding, ProviderError> {
        let required = string_list(snapshot, "required-supplies");
        let inventory = snapshot.get("inventory").and_then(|v| v.as_object());

        let mut missing = Vec::new();
        let mut low = Vec::new();
        for item in &required {
            let count = inventory
                .and_then(|inv| inv.get(item))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            if count == 0 {
                missing.push(item.clone());
            } else if count < self.low_stock_threshold {
                low.push(item.clone());
            }
        }

        if !missing.is_empty() {
            return Ok(Finding::blocking(format!(
                "required supplies unavailable: {}",
                missing.join(", ")
            )));
        }
        if !low.is_empty() {
            return Ok(
                Finding::warning(format!("low stock: {}", low.join(", ")))
                    .with_proposal("supply-reorder", json!(low)),
            );
        }

        Ok(Finding::info(format!(
            "all {} required supplies in stock",
            required.len()
        )))
    }
}

/// Discharge planner. Proposes discharge approval when the case carries no
/// medication hold; otherwise reports the hold and proposes nothing.
#[derive(Default)]
pub struct DischargeAgent;

impl DischargeAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CapabilityProvider for DischargeAgent {
    async fn invoke(
        &self,
        snapshot: &CaseSnapshot,
        _input: &serde_json::Value,
    ) -> Result<Finding, ProviderError> {
        if snapshot.get("medication-hold").is_some() {
            return Ok(Finding::warning(
                "discharge deferred: medication hold active on case",
            ));
        }

        Ok(
            Finding::info("patient meets discharge criteria, home care arranged")
                .with_proposal("discharge-approved", json!(true))
                .with_proposal("discharge-plan", json!("home-care-with-followup")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::types::Severity;
    use std::collections::BTreeMap;

    fn snapshot_with(values: &[(&str, serde_json::Value)]) -> CaseSnapshot {
        let mut map = BTreeMap::new();
        for (k, v) in values {
            map.insert(k.to_string(), v.clone());
        }
        CaseSnapshot {
            case_id: "case-1".to_string(),
            version: 1,
            values: map,
        }
    }

    #[tokio::test]
    async fn pharmacy_flags_known_interaction_as_blocking() {
        let agent = PharmacyAgent::new();
        let snapshot = snapshot_with(&[("active-medications", json!(["Warfarin", "aspirin"]))]);

        let finding = agent.invoke(&snapshot, &json!(null)).await.unwrap();

        assert_eq!(finding.severity, Severity::Blocking);
        assert!(finding.rationale.contains("warfarin"));
        assert!(finding.proposal.unwrap().contains_key("medication-hold"));
    }

    #[tokio::test]
    async fn pharmacy_passes_clean_medication_list() {
        let agent = PharmacyAgent::new();
        let snapshot = snapshot_with(&[("active-medications", json!(["paracetamol"]))]);

        let finding = agent.invoke(&snapshot, &json!(null)).await.unwrap();

        assert_eq!(finding.severity, Severity::Info);
        assert!(finding.proposal.is_none());
    }

    #[tokio::test]
    async fn supply_blocks_on_missing_required_item() {
        let agent = SupplyAgent::new();
        let snapshot = snapshot_with(&[
            ("required-supplies", json!(["blood_o_positive"])),
            ("inventory", json!({"surgical_gloves": 1000})),
        ]);

        let finding = agent.invoke(&snapshot, &json!(null)).await.unwrap();
        assert_eq!(finding.severity, Severity::Blocking);
    }

    #[tokio::test]
    async fn supply_warns_and_proposes_reorder_on_low_stock() {
        let agent = SupplyAgent::new();
        let snapshot = snapshot_with(&[
            ("required-supplies", json!(["iv_fluids"])),
            ("inventory", json!({"iv_fluids": 3})),
        ]);

        let finding = agent.invoke(&snapshot, &json!(null)).await.unwrap();
        assert_eq!(finding.severity, Severity::Warning);
        assert!(finding.proposal.unwrap().contains_key("supply-reorder"));
    }

    #[tokio::test]
    async fn discharge_proposes_approval_without_hold() {
        let agent = DischargeAgent::new();
        let snapshot = snapshot_with(&[]);

        let finding = agent.invoke(&snapshot, &json!(null)).await.unwrap();
        let proposal = finding.proposal.unwrap();
        assert_eq!(proposal["discharge-approved"], json!(true));
    }

    #[test]
    fn builtin_registry_takes_safety_flags_from_config() {
        let mut config = MediCoordinatorConfig::default();
        let registry = builtin_registry(&config);
        assert!(registry.is_safety_relevant("pharmacy-check"));
        assert!(registry.is_safety_relevant("supply-check"));
        assert!(!registry.is_safety_relevant("discharge-check"));

        for capability in &mut config.capabilities {
            if capability.name == "discharge-check" {
                capability.safety_relevant = true;
            }
        }
        assert!(builtin_registry(&config).is_safety_relevant("discharge-check"));
    }

    #[tokio::test]
    async fn discharge_defers_under_medication_hold() {
        let agent = DischargeAgent::new();
        let snapshot = snapshot_with(&[("medication-hold", json!("pending-review"))]);

        let finding = agent.invoke(&snapshot, &json!(null)).await.unwrap();
        assert_eq!(finding.severity, Severity::Warning);
        assert!(finding.proposal.is_none());
    }
}
