// Task Scheduler - topological concurrent dispatch of agent tasks
// Tasks with no unmet dependencies run concurrently; dependents are issued
// as results arrive. Agent-local failures are absorbed into missing-verdict
// markers here; only the global deadline propagates as a request failure.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::{AgentAdapter, AgentInvocationError, AgentRegistry};
use crate::case::{CaseStore, CaseStoreError};
use crate::coordination::types::{
    CoordinationRequest, FailureReason, Task, TaskFailure, TaskStatus, Verdict, VerdictSet,
};

#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Global request deadline elapsed before the task graph completed.
    /// Completed verdicts are preserved for audit.
    #[error("global deadline of {deadline_ms}ms elapsed with {outstanding} tasks outstanding")]
    GlobalDeadlineExceeded {
        deadline_ms: u64,
        outstanding: usize,
        collected: VerdictSet,
    },
    #[error("capability {0} is not registered")]
    UnknownCapability(String),
    #[error("dependency graph has a cycle involving {0}")]
    DependencyCycle(String),
    #[error("dependency {dependency} of {capability} is not part of the request")]
    UnknownDependency {
        capability: String,
        dependency: String,
    },
    #[error(transparent)]
    Store(#[from] CaseStoreError),
}

/// Retry and deadline policy. The exact retry count and backoff curve are
/// deployment configuration, not engine behavior.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub task_deadline: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 250,
            backoff_cap_ms: 2000,
            task_deadline: Duration::from_secs(10),
        }
    }
}

fn backoff_delay(attempt: u32, config: &SchedulerConfig) -> Duration {
    let exp = config
        .backoff_base_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(config.backoff_cap_ms);
    // +/- 50% jitter so sibling retries do not stampede together
    let factor = 0.5 + rand::random::<f64>();
    Duration::from_millis((exp as f64 * factor) as u64)
}

fn failure_reason(err: &AgentInvocationError) -> FailureReason {
    match err {
        AgentInvocationError::Timeout { .. } => FailureReason::TimedOut,
        AgentInvocationError::Unavailable { detail, .. } => FailureReason::Unavailable {
            detail: detail.clone(),
        },
        AgentInvocationError::Agent { detail, .. } => FailureReason::AgentError {
            detail: detail.clone(),
        },
    }
}

enum TaskOutcome {
    Completed(Verdict),
    Failed(TaskFailure),
}

pub struct TaskScheduler {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn CaseStore>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: Arc<dyn CaseStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Drive the request's task graph to completion under the global
    /// deadline and return every verdict and failure marker collected.
    pub async fn execute(
        &self,
        request: &CoordinationRequest,
    ) -> Result<VerdictSet, SchedulingError> {
        self.validate(request)?;

        let mut remaining: HashSet<String> = request.capabilities.iter().cloned().collect();
        let mut completed: HashMap<String, TaskOutcome> = HashMap::new();
        let mut running: HashSet<String> = HashSet::new();
        let mut join_set: JoinSet<(String, TaskOutcome)> = JoinSet::new();

        let deadline = tokio::time::Instant::now() + request.deadline;

        loop {
            // Tasks whose dependencies all completed successfully become
            // runnable; tasks behind a failed dependency are marked blocked
            // without ever being dispatched.
            let mut newly_blocked = Vec::new();
            let mut runnable = Vec::new();
            for capability in &remaining {
                let deps = request
                    .dependencies
                    .get(capability)
                    .map(|d| d.as_slice())
                    .unwrap_or_default();
                if let Some(failed_dep) = deps.iter().find(|d| {
                    matches!(completed.get(d.as_str()), Some(TaskOutcome::Failed(_)))
                }) {
                    newly_blocked.push((capability.clone(), failed_dep.clone()));
                } else if deps.iter().all(|d| {
                    matches!(completed.get(d.as_str()), Some(TaskOutcome::Completed(_)))
                }) {
                    runnable.push(capability.clone());
                }
            }

            for (capability, dependency) in newly_blocked {
                remaining.remove(&capability);
                let task = Task::new(
                    &request.case_id,
                    &capability,
                    request.input.clone(),
                    self.config.task_deadline,
                );
                warn!(
                    capability = %capability,
                    dependency = %dependency,
                    "Task blocked by failed dependency"
                );
                completed.insert(
                    capability.clone(),
                    TaskOutcome::Failed(TaskFailure {
                        task_id: task.task_id,
                        capability,
                        reason: FailureReason::Blocked { dependency },
                    }),
                );
            }

            for capability in runnable {
                remaining.remove(&capability);
                running.insert(capability.clone());
                let adapter = self
                    .registry
                    .adapter(&capability)
                    .ok_or_else(|| SchedulingError::UnknownCapability(capability.clone()))?;
                let store = Arc::clone(&self.store);
                let config = self.config.clone();
                let case_id = request.case_id.clone();
                let input = request.input.clone();
                join_set.spawn(async move {
                    let outcome = run_task(adapter, store, config, case_id, input).await;
                    (capability, outcome)
                });
            }

            if remaining.is_empty() && join_set.is_empty() {
                break;
            }

            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok((capability, outcome))) => {
                            running.remove(&capability);
                            completed.insert(capability, outcome);
                        }
                        Some(Err(join_err)) => {
                            // A panicking provider must not take the whole
                            // request down with it.
                            warn!(error = %join_err, "Task join failed");
                        }
                        None => {}
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let outstanding = remaining.len() + running.len();
                    join_set.abort_all();
                    warn!(
                        case_id = %request.case_id,
                        outstanding,
                        "Global deadline elapsed, cancelling in-flight tasks"
                    );
                    return Err(SchedulingError::GlobalDeadlineExceeded {
                        deadline_ms: request.deadline.as_millis() as u64,
                        outstanding,
                        collected: collect(completed),
                    });
                }
            }
        }

        let set = collect(completed);
        info!(
            case_id = %request.case_id,
            verdicts = set.verdicts.len(),
            failures = set.failures.len(),
            "Task graph complete"
        );
        Ok(set)
    }

    fn validate(&self, request: &CoordinationRequest) -> Result<(), SchedulingError> {
        let requested: HashSet<&str> = request.capabilities.iter().map(|c| c.as_str()).collect();
        for capability in &request.capabilities {
            if !self.registry.contains(capability) {
                return Err(SchedulingError::UnknownCapability(capability.clone()));
            }
        }
        for (capability, deps) in &request.dependencies {
            for dependency in deps {
                if !requested.contains(dependency.as_str()) {
                    return Err(SchedulingError::UnknownDependency {
                        capability: capability.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        check_acyclic(&request.capabilities, &request.dependencies)
    }
}

/// Kahn's algorithm over the declared dependency edges.
fn check_acyclic(
    capabilities: &[String],
    dependencies: &BTreeMap<String, Vec<String>>,
) -> Result<(), SchedulingError> {
    let mut unmet: HashMap<&str, HashSet<&str>> = capabilities
        .iter()
        .map(|c| {
            let deps = dependencies
                .get(c)
                .map(|d| d.iter().map(|s| s.as_str()).collect())
                .unwrap_or_default();
            (c.as_str(), deps)
        })
        .collect();

    while !unmet.is_empty() {
        let ready: Vec<&str> = unmet
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(c, _)| *c)
            .collect();
        if ready.is_empty() {
            let stuck = unmet.keys().next().unwrap_or(&"?").to_string();
            return Err(SchedulingError::DependencyCycle(stuck));
        }
        for done in &ready {
            unmet.remove(done);
        }
        for deps in unmet.values_mut() {
            for done in &ready {
                deps.remove(done);
            }
        }
    }
    Ok(())
}

/// One task's life: bounded retries with backoff, re-reading case state on
/// every attempt so a retried agent never acts on a pre-delay snapshot.
async fn run_task(
    adapter: AgentAdapter,
    store: Arc<dyn CaseStore>,
    config: SchedulerConfig,
    case_id: String,
    input: serde_json::Value,
) -> TaskOutcome {
    let mut attempt = 0u32;
    loop {
        let mut task = Task::new(&case_id, adapter.capability(), input.clone(), config.task_deadline);

        let snapshot = match store.read(&case_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(capability = %task.capability, error = %err, "Snapshot read failed");
                task.status = TaskStatus::Failed;
                return TaskOutcome::Failed(TaskFailure {
                    task_id: task.task_id,
                    capability: task.capability,
                    reason: FailureReason::Unavailable {
                        detail: format!("case state unreadable: {err}"),
                    },
                });
            }
        };

        task.status = TaskStatus::Running;
        match adapter.invoke(&task, &snapshot).await {
            Ok(verdict) => {
                debug!(
                    capability = %verdict.capability,
                    severity = %verdict.finding.severity,
                    case_version = verdict.case_version,
                    "Verdict collected"
                );
                return TaskOutcome::Completed(verdict);
            }
            Err(err) if attempt < config.max_retries => {
                let delay = backoff_delay(attempt, &config);
                warn!(
                    capability = %task.capability,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Agent invocation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    capability = %task.capability,
                    attempts = attempt + 1,
                    error = %err,
                    "Agent invocation failed, retries exhausted"
                );
                let reason = failure_reason(&err);
                task.status = match reason {
                    FailureReason::TimedOut => TaskStatus::TimedOut,
                    _ => TaskStatus::Failed,
                };
                return TaskOutcome::Failed(TaskFailure {
                    task_id: task.task_id,
                    capability: task.capability,
                    reason,
                });
            }
        }
    }
}

fn collect(completed: HashMap<String, TaskOutcome>) -> VerdictSet {
    let mut set = VerdictSet::default();
    // Deterministic ordering keeps resolution and audit output stable
    let mut outcomes: Vec<(String, TaskOutcome)> = completed.into_iter().collect();
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, outcome) in outcomes {
        match outcome {
            TaskOutcome::Completed(verdict) => set.verdicts.push(verdict),
            TaskOutcome::Failed(failure) => set.failures.push(failure),
        }
    }
    set
}
