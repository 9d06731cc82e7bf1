use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use medi_coordinator::agent::builtin::builtin_registry;
use medi_coordinator::agent::{CapabilityProvider, ProviderError};
use medi_coordinator::case::{CaseSnapshot, InMemoryCaseStore};
use medi_coordinator::coordination::types::Finding;
use medi_coordinator::{
    config, init_telemetry, CoordinationRequest, OrchestrationSupervisor, SchedulerConfig,
    TracingAuditSink,
};

#[derive(Parser)]
#[command(name = "medi-coordinator")]
#[command(about = "Multi-agent hospital coordination engine")]
#[command(long_about = "medi-coordinator fans coordination requests out to specialized \
                       hospital agents (pharmacy, supply, discharge), reconciles their \
                       verdicts against shared case state, and produces one auditable \
                       decision or escalation per request.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in demo scenarios
    List,
    /// Run one demo scenario end to end and print the terminal decision
    Scenario {
        /// Scenario name (see `list`)
        name: String,
    },
}

const SCENARIOS: &[(&str, &str)] = &[
    (
        "routine-discharge",
        "clean case: pharmacy and supply clear, discharge approved, state advances",
    ),
    (
        "drug-interaction",
        "pharmacy finds a severe interaction: escalated, state untouched",
    ),
    (
        "supply-timeout",
        "supply agent never answers: safety-relevant gap, escalated",
    ),
];

/// Demo stand-in for an agent that has gone dark.
struct UnresponsiveAgent;

#[async_trait]
impl CapabilityProvider for UnresponsiveAgent {
    async fn invoke(
        &self,
        _snapshot: &CaseSnapshot,
        _input: &serde_json::Value,
    ) -> Result<Finding, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Finding::info("unreachable"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config()?;
    init_telemetry(&settings.observability)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::List => {
            for (name, description) in SCENARIOS {
                println!("{name:20} {description}");
            }
            Ok(())
        }
        Commands::Scenario { name } => run_scenario(&name).await,
    }
}

async fn run_scenario(name: &str) -> Result<()> {
    let settings = config()?;
    let store = Arc::new(InMemoryCaseStore::new());
    // Safety-relevance comes from the configured capability roster
    let mut registry = builtin_registry(settings);
    let mut scheduler_config = settings.scheduler_config();

    let case_values: BTreeMap<String, serde_json::Value> = match name {
        "routine-discharge" => [
            ("active-medications".to_string(), json!([])),
            ("required-supplies".to_string(), json!(["iv_fluids"])),
            ("inventory".to_string(), json!({"iv_fluids": 200})),
        ]
        .into(),
        "drug-interaction" => [
            (
                "active-medications".to_string(),
                json!(["warfarin", "aspirin"]),
            ),
            ("required-supplies".to_string(), json!([])),
        ]
        .into(),
        "supply-timeout" => {
            registry.register(
                "supply-check",
                settings.is_safety_relevant("supply-check"),
                Arc::new(UnresponsiveAgent),
            );
            // Short task deadline so the demo does not sit through the
            // full configured retry budget
            scheduler_config = SchedulerConfig {
                max_retries: 1,
                task_deadline: Duration::from_secs(2),
                ..scheduler_config
            };
            [("active-medications".to_string(), json!([]))].into()
        }
        other => {
            anyhow::bail!("unknown scenario: {other} (run `medi-coordinator list`)");
        }
    };

    store.open_case("case-demo", case_values).await;

    let supervisor = OrchestrationSupervisor::new(
        Arc::new(registry),
        store,
        scheduler_config,
        Arc::new(TracingAuditSink),
    );

    let request = CoordinationRequest::new(
        "case-demo",
        &["pharmacy-check", "supply-check", "discharge-check"],
    )
    .depends_on("discharge-check", &["pharmacy-check", "supply-check"])
    .with_deadline(settings.request_deadline());

    let decision = supervisor.coordinate(request).await;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    let summary = supervisor.metrics().summary().await;
    println!("\nsummary: {}", serde_json::to_string(&summary)?);
    Ok(())
}
