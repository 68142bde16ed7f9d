//! Task orchestration engine
//!
//! [`Orchestrator`] owns the lifecycle of every task in a run. One call to
//! [`Orchestrator::step`] is one iteration:
//!
//! 1. bump the iteration counter and stop if the budget is spent
//! 2. start every pending task, rejecting invalid or out-of-scope targets
//! 3. dispatch the rest to their tool runners and join the results in task order
//! 4. store results and apply the derivation rules
//! 5. replace failed tasks with their next attempt when the retry policy allows
//! 6. rebuild the active set and decide whether the run continues
//!
//! The [`WorkflowState`] travels by value through `step`; nothing else
//! mutates it.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    contract::ToolResult,
    derivation::derive,
    error::ReconError,
    metrics::{MetricsSnapshot, RunMetrics},
    runner::ToolRegistry,
    scope::ScopeValidator,
    task::{Task, TaskStatus, ToolKind},
};

/// Budgets applied by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorPolicy {
    /// Iterations that may process tasks; the next call stops the run
    pub max_iterations: u32,
    /// Retries allowed after a task's first attempt
    pub max_retries: u32,
    /// Tool invocations in flight at once within one iteration
    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_retries: 2,
            max_concurrent_tasks: 1,
        }
    }
}

/// Coarse phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initialized,
    Running,
    Terminated,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No task left pending or running
    Settled,
    /// Iteration counter went past the maximum
    IterationBudget,
    /// The driver's wall-clock budget elapsed
    WallClock,
}

impl TerminationReason {
    /// Whether the run was cut short by a budget
    pub fn is_budget(&self) -> bool {
        !matches!(self, Self::Settled)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settled => write!(f, "all tasks settled"),
            Self::IterationBudget => write!(f, "iteration budget exhausted"),
            Self::WallClock => write!(f, "wall-clock budget exhausted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn marker(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "OK",
            Self::Warning => "WARN",
            Self::Error => "FAIL",
        }
    }
}

/// One human-readable event in the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub iteration: u32,
    pub level: LogLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>2}] {:<4} {}", self.iteration, self.level.marker(), self.message)
    }
}

/// Results keyed by target, then by tool
pub type ResultsMap = BTreeMap<String, BTreeMap<ToolKind, ToolResult>>;

/// Aggregate state of one audit run
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub tasks: Vec<Task>,
    pub results: ResultsMap,
    pub logs: Vec<LogEntry>,
    pub iteration: u32,
    pub scope: Arc<ScopeValidator>,
    pub running: bool,
    pub phase: RunPhase,
    pub termination: Option<TerminationReason>,
}

impl WorkflowState {
    /// Tasks still pending or running
    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status().is_active())
    }

    pub fn has_active_tasks(&self) -> bool {
        self.active_tasks().next().is_some()
    }

    pub fn result(&self, target: &str, tool: ToolKind) -> Option<&ToolResult> {
        self.results.get(target).and_then(|by_tool| by_tool.get(&tool))
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(iteration = self.iteration, "{}", message),
            LogLevel::Warning => warn!(iteration = self.iteration, "{}", message),
            LogLevel::Error => error!(iteration = self.iteration, "{}", message),
        }
        self.logs.push(LogEntry {
            iteration: self.iteration,
            level,
            message,
            at: Utc::now(),
        });
    }
}

/// Drives tasks through their lifecycle, one iteration per [`step`](Self::step)
pub struct Orchestrator {
    policy: OrchestratorPolicy,
    registry: ToolRegistry,
    metrics: RunMetrics,
}

impl Orchestrator {
    pub fn new(policy: OrchestratorPolicy, registry: ToolRegistry) -> Self {
        Self {
            policy,
            registry,
            metrics: RunMetrics::new(),
        }
    }

    pub fn policy(&self) -> &OrchestratorPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Create the state for a new run from its seed tasks
    pub fn initialize(&self, seeds: Vec<Task>, scope: Arc<ScopeValidator>) -> WorkflowState {
        let mut state = WorkflowState {
            tasks: seeds,
            results: ResultsMap::new(),
            logs: Vec::new(),
            iteration: 0,
            scope,
            running: true,
            phase: RunPhase::Initialized,
            termination: None,
        };

        let count = state.tasks.len();
        state.log(LogLevel::Info, format!("Initialized workflow with {} tasks", count));

        if !state.has_active_tasks() {
            self.terminate(&mut state, TerminationReason::Settled);
        }
        state
    }

    /// Stop a run from outside the step loop (wall-clock budget)
    pub fn halt(&self, mut state: WorkflowState, reason: TerminationReason) -> WorkflowState {
        if state.running {
            self.terminate(&mut state, reason);
        }
        state
    }

    /// Run one iteration
    pub async fn step(&self, mut state: WorkflowState) -> WorkflowState {
        if !state.running {
            debug!(iteration = state.iteration, "Step called on a stopped run, ignoring");
            return state;
        }

        state.iteration += 1;
        let active = state.active_tasks().count();
        self.metrics.record_iteration(state.iteration, active);
        debug!(iteration = state.iteration, active, "Starting iteration");

        if state.iteration > self.policy.max_iterations {
            self.terminate(&mut state, TerminationReason::IterationBudget);
            return state;
        }
        state.phase = RunPhase::Running;

        let pending: Vec<usize> = state
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status() == TaskStatus::Pending)
            .map(|(idx, _)| idx)
            .collect();

        let mut dispatch = Vec::with_capacity(pending.len());
        for idx in pending {
            if let Err(e) = state.tasks[idx].start() {
                state.log(LogLevel::Error, e.to_string());
                continue;
            }
            match precheck(&state.scope, &state.tasks[idx].target) {
                Ok(()) => dispatch.push(idx),
                Err(e) => self.fail_task(&mut state, idx, e, None),
            }
        }

        let outcomes = self.dispatch(&state, &dispatch).await;

        let mut next_generation = Vec::new();
        for (idx, result) in dispatch.into_iter().zip(outcomes) {
            let tool = state.tasks[idx].tool;
            let result = result.validated_for(tool);
            if result.success {
                self.complete_task(&mut state, idx, result, &mut next_generation);
            } else {
                let target = state.tasks[idx].target.clone();
                let error = ReconError::tool(tool.as_str(), target, result.error_message());
                self.fail_task(&mut state, idx, error, Some(result));
            }
        }

        self.schedule_retries(&mut state, &mut next_generation);

        state.tasks.retain(|task| task.status().is_active());
        state.tasks.extend(next_generation);

        state.running =
            state.iteration <= self.policy.max_iterations && state.has_active_tasks();
        if !state.running {
            self.terminate(&mut state, TerminationReason::Settled);
        }
        state
    }

    async fn dispatch(&self, state: &WorkflowState, indices: &[usize]) -> Vec<ToolResult> {
        let semaphore = Arc::new(Semaphore::new(self.policy.max_concurrent_tasks.max(1)));

        let invocations = indices.iter().map(|&idx| {
            let task = &state.tasks[idx];
            let tool = task.tool;
            let target = task.target.clone();
            let binding = self.registry.binding(tool).cloned();
            let semaphore = semaphore.clone();

            self.metrics.record_dispatch(tool);
            crate::log_task_dispatch!(tool.as_str(), &target, task.retry_count);

            async move {
                let Some(binding) = binding else {
                    return ToolResult::failure(format!("No runner configured for {}", tool));
                };
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return ToolResult::failure("dispatch semaphore closed"),
                };
                binding.runner.run(&target, binding.timeout).await
            }
        });

        join_all(invocations).await
    }

    fn complete_task(
        &self,
        state: &mut WorkflowState,
        idx: usize,
        result: ToolResult,
        next_generation: &mut Vec<Task>,
    ) {
        let derivation = derive(&state.tasks[idx], &result);
        let task = &mut state.tasks[idx];
        let (tool, target) = (task.tool, task.target.clone());

        self.metrics
            .record_completion(tool, Duration::from_millis(result.duration_ms));
        crate::log_task_complete!(tool.as_str(), &target, result.findings.count(), result.duration_ms);

        if let Err(e) = task.complete(result.clone()) {
            state.log(LogLevel::Error, e.to_string());
            return;
        }
        state
            .results
            .entry(target.clone())
            .or_default()
            .insert(tool, result);
        state.log(LogLevel::Success, format!("{} completed on {}", tool, target));

        for note in derivation.notes {
            state.log(LogLevel::Info, note);
        }
        self.metrics.record_derived(derivation.tasks.len());
        for child in derivation.tasks {
            state.log(
                LogLevel::Info,
                format!("Queued {} on {} from {} findings", child.tool, child.target, tool),
            );
            next_generation.push(child);
        }
    }

    fn fail_task(
        &self,
        state: &mut WorkflowState,
        idx: usize,
        error: ReconError,
        result: Option<ToolResult>,
    ) {
        let tool = state.tasks[idx].tool;
        self.metrics.record_failure(tool, &error);
        crate::log_task_failed!(tool.as_str(), &state.tasks[idx].target, error);

        let message = format!("{} failed: {}", tool, error);
        if let Err(e) = state.tasks[idx].fail(error, result) {
            state.log(LogLevel::Error, e.to_string());
            return;
        }
        state.log(LogLevel::Error, message);
    }

    fn schedule_retries(&self, state: &mut WorkflowState, next_generation: &mut Vec<Task>) {
        let max_retries = self.policy.max_retries;
        let mut entries = Vec::new();

        for task in state.tasks.iter().filter(|t| t.status() == TaskStatus::Failed) {
            match task.next_attempt(max_retries) {
                Some(retry) => {
                    self.metrics.record_retry(task.tool);
                    entries.push((
                        LogLevel::Warning,
                        format!(
                            "Retrying {} on {} (attempt {} of {})",
                            retry.tool,
                            retry.target,
                            retry.retry_count + 1,
                            max_retries + 1
                        ),
                    ));
                    next_generation.push(retry);
                }
                None if task.error.as_ref().map_or(false, |e| !e.is_recoverable()) => {
                    entries.push((
                        LogLevel::Warning,
                        format!("Not retrying {} on {}: failure is terminal", task.tool, task.target),
                    ));
                }
                None => {
                    entries.push((
                        LogLevel::Warning,
                        format!(
                            "Giving up on {} for {} after {} retries",
                            task.tool, task.target, task.retry_count
                        ),
                    ));
                }
            }
        }

        for (level, message) in entries {
            state.log(level, message);
        }
    }

    fn terminate(&self, state: &mut WorkflowState, reason: TerminationReason) {
        state.running = false;
        state.phase = RunPhase::Terminated;
        state.termination = Some(reason);

        let message = match reason {
            TerminationReason::Settled => {
                format!("Workflow finished after {} iterations", state.iteration)
            }
            TerminationReason::IterationBudget => {
                let error = ReconError::budget("max iterations", u64::from(self.policy.max_iterations));
                format!("Emergency stop: {}", error)
            }
            TerminationReason::WallClock => "Emergency stop: run timed out".to_string(),
        };
        let level = if reason.is_budget() { LogLevel::Warning } else { LogLevel::Info };
        state.log(level, message);
    }
}

/// Cheap structural check plus scope authorization, before any tool runs
pub fn precheck(scope: &ScopeValidator, target: &str) -> Result<(), ReconError> {
    if target.is_empty() {
        return Err(ReconError::invalid_target(target, "empty target"));
    }
    if target.contains(char::is_whitespace) {
        return Err(ReconError::invalid_target(target, "target contains whitespace"));
    }
    if !target.contains('.') && !target.contains(':') {
        return Err(ReconError::invalid_target(
            target,
            "target must contain '.' or ':'",
        ));
    }
    if !scope.validate(target) {
        return Err(ReconError::scope_violation(target));
    }
    Ok(())
}
