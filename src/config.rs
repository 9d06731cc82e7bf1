use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::coordination::scheduler::SchedulerConfig;

/// Main configuration structure for medi-coordinator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediCoordinatorConfig {
    /// Scheduling, retry, and deadline settings
    pub scheduler: SchedulerSettings,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Capability roster with safety-relevance flags
    pub capabilities: Vec<CapabilitySettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSettings {
    /// Bounded retry count per agent task
    pub max_retries: u32,
    /// Exponential backoff base in milliseconds
    pub backoff_base_ms: u64,
    /// Backoff cap in milliseconds
    pub backoff_cap_ms: u64,
    /// Per-task deadline in seconds
    pub task_deadline_seconds: u64,
    /// Default global request deadline in seconds
    pub request_deadline_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON-structured logs
    pub json_logs: bool,
}

/// A capability the deployment expects agents to register under, and
/// whether its absence blocks auto-commit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapabilitySettings {
    pub name: String,
    pub safety_relevant: bool,
}

impl Default for MediCoordinatorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings {
                max_retries: 2,
                backoff_base_ms: 250,
                backoff_cap_ms: 2000,
                task_deadline_seconds: 10,
                request_deadline_seconds: 30,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            capabilities: vec![
                CapabilitySettings {
                    name: "pharmacy-check".to_string(),
                    safety_relevant: true,
                },
                CapabilitySettings {
                    name: "supply-check".to_string(),
                    safety_relevant: true,
                },
                CapabilitySettings {
                    name: "discharge-check".to_string(),
                    safety_relevant: false,
                },
            ],
        }
    }
}

impl MediCoordinatorConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. medi-coordinator.toml
    /// 3. Environment variables (prefixed with MEDI_COORDINATOR_)
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .add_source(Config::try_from(&defaults)?);

        if Path::new("medi-coordinator.toml").exists() {
            builder = builder.add_source(File::with_name("medi-coordinator"));
        }

        builder = builder.add_source(
            Environment::with_prefix("MEDI_COORDINATOR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_retries: self.scheduler.max_retries,
            backoff_base_ms: self.scheduler.backoff_base_ms,
            backoff_cap_ms: self.scheduler.backoff_cap_ms,
            task_deadline: Duration::from_secs(self.scheduler.task_deadline_seconds),
        }
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.scheduler.request_deadline_seconds)
    }

    pub fn is_safety_relevant(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .find(|c| c.name == capability)
            .map(|c| c.safety_relevant)
            .unwrap_or(false)
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<MediCoordinatorConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = MediCoordinatorConfig::load_env_file();
        MediCoordinatorConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static MediCoordinatorConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
