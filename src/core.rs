//! Application driver
//!
//! [`Application`] wires configuration, scope, tool registry and report
//! generation together, then drives an [`Orchestrator`] until the run
//! settles or one of its budgets is spent.

use chrono::Utc;
use std::{fmt, path::Path, sync::Arc, time::Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    cli::Cli,
    config::AppConfig,
    error::{ReconError, Result},
    logging::TimingLogger,
    orchestrator::{precheck, Orchestrator, OrchestratorPolicy, TerminationReason},
    reporting::{generate_human_report, AuditReport, ReportGenerator},
    runner::ToolRegistry,
    scope::ScopeValidator,
    task::{Task, ToolKind},
};

/// Main application orchestrator
pub struct Application {
    config: AppConfig,
    policy: OrchestratorPolicy,
    registry: ToolRegistry,
    scope: Arc<ScopeValidator>,
    report_generator: Box<dyn ReportGenerator + Send + Sync>,
}

impl Application {
    /// Create an application whose tools are the commands in the configuration
    pub async fn new(config: AppConfig) -> Result<Self> {
        let registry = ToolRegistry::from_config(&config.tools)?;
        Self::with_registry(config, registry).await
    }

    /// Create an application with an explicit tool registry
    pub async fn with_registry(config: AppConfig, registry: ToolRegistry) -> Result<Self> {
        let scope = Arc::new(ScopeValidator::new(config.scope_definition()?));
        if scope.scope().is_empty() {
            tracing::warn!("Scope is empty; every target will be rejected");
        }
        let report_generator = crate::reporting::create_report_generator(&config).await?;

        tracing::debug!(tools = ?registry, "Tool registry ready");
        Ok(Self {
            policy: config.policy(),
            config,
            registry,
            scope,
            report_generator,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the application with CLI arguments.
    ///
    /// Returns `None` for a dry run.
    pub async fn run(&self, cli: &Cli) -> Result<Option<AuditReport>> {
        let target = cli
            .seed_target()
            .ok_or_else(|| ReconError::validation("target", "No seed target given"))?;
        let seed = Task::new(cli.seed_tool(), target);

        if cli.dry_run {
            println!("{}", self.plan(&seed));
            return Ok(None);
        }

        let report = self.audit(seed).await;

        if let Some(path) = &cli.output {
            self.write_report(&report, path).await?;
        }
        if !cli.quiet {
            println!("{}", generate_human_report(&report));
        }

        Ok(Some(report))
    }

    /// What a run would do with `seed`, without running any tool
    pub fn plan(&self, seed: &Task) -> SeedPlan {
        SeedPlan {
            target: seed.target.clone(),
            tool: seed.tool,
            verdict: precheck(&self.scope, &seed.target),
            available_tools: self.registry.available_tools(),
            policy: self.policy,
            run_timeout_secs: self.config.orchestrator.run_timeout_secs,
        }
    }

    /// Drive one full run from `seed` and summarize it
    pub async fn audit(&self, seed: Task) -> AuditReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("audit", run_id = %run_id, seed = %seed.target);
        self.drive(run_id, seed).instrument(span).await
    }

    async fn drive(&self, run_id: Uuid, seed: Task) -> AuditReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = self.config.run_timeout();
        let delay = self.config.step_delay();
        let timer = TimingLogger::start(format!("audit {}", run_id));

        let orchestrator = Orchestrator::new(self.policy, self.registry.clone());
        let mut state = orchestrator.initialize(vec![seed.clone()], self.scope.clone());

        while state.running {
            // A started step always runs to completion
            if started.elapsed() >= deadline {
                let error = ReconError::budget("wall clock seconds", deadline.as_secs());
                tracing::warn!(error = %error, kind = error.kind(), iteration = state.iteration, "Stopping run");
                state = orchestrator.halt(state, TerminationReason::WallClock);
                break;
            }

            state = orchestrator.step(state).await;
            timer.checkpoint(&format!("iteration {}", state.iteration));

            if state.running && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let report = AuditReport::from_state(run_id, &seed, started_at, &state, orchestrator.metrics());
        tracing::info!(
            iterations = report.iterations,
            targets = report.results.len(),
            outcome = ?report.termination,
            "Audit finished"
        );
        report
    }

    async fn write_report(&self, report: &AuditReport, path: &Path) -> Result<()> {
        let format = self.config.output.default_format.as_str();
        self.report_generator
            .generate_report(report, format, path)
            .await
            .map_err(|e| {
                crate::log_error_with_context!(e, "report generation");
                e
            })
    }
}

/// Dry-run summary for a seed task
#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub target: String,
    pub tool: ToolKind,
    pub verdict: std::result::Result<(), ReconError>,
    pub available_tools: Vec<ToolKind>,
    pub policy: OrchestratorPolicy,
    pub run_timeout_secs: u64,
}

impl fmt::Display for SeedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Seed: {} on {}", self.tool, self.target)?;
        match &self.verdict {
            Ok(()) => writeln!(f, "Scope: authorized")?,
            Err(e) => writeln!(f, "Scope: rejected ({})", e)?,
        }
        let tools: Vec<&str> = self.available_tools.iter().map(ToolKind::as_str).collect();
        writeln!(
            f,
            "Tools: {}",
            if tools.is_empty() { "none configured".to_string() } else { tools.join(", ") }
        )?;
        write!(
            f,
            "Budgets: {} iterations, {} retries, {} concurrent, {}s wall clock",
            self.policy.max_iterations,
            self.policy.max_retries,
            self.policy.max_concurrent_tasks,
            self.run_timeout_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contract::{Findings, PortFinding, ToolResult},
        runner::ToolRunner,
    };
    use async_trait::async_trait;
    use clap::Parser;
    use std::time::Duration;
    use tempfile::TempDir;

    struct SlowRunner;

    #[async_trait]
    impl ToolRunner for SlowRunner {
        async fn run(&self, _target: &str, _timeout: Duration) -> ToolResult {
            tokio::time::sleep(Duration::from_millis(30)).await;
            ToolResult::failure("connection refused")
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    struct WebHost;

    #[async_trait]
    impl ToolRunner for WebHost {
        async fn run(&self, _target: &str, _timeout: Duration) -> ToolResult {
            ToolResult::success(Findings::Ports(vec![PortFinding::open(22, Some("ssh"))]))
        }

        fn describe(&self) -> String {
            "web host".to_string()
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.scope.domains = vec![".example.com".into(), "example.com".into()];
        config
    }

    #[tokio::test]
    async fn test_plan_reports_scope_decision() {
        let app = Application::with_registry(config(), ToolRegistry::new()).await.unwrap();

        let plan = app.plan(&Task::new(ToolKind::PortScan, "app.example.com"));
        assert!(plan.verdict.is_ok());
        assert!(plan.to_string().contains("none configured"));

        let plan = app.plan(&Task::new(ToolKind::PortScan, "evil.com"));
        assert!(plan.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn test_wall_clock_budget_halts_run() {
        let mut config = config();
        config.orchestrator.run_timeout_secs = 1;
        config.orchestrator.max_retries = 1_000;
        config.orchestrator.max_iterations = 1_000;
        config.orchestrator.step_delay_ms = 100;
        let registry = ToolRegistry::new().with_runner(ToolKind::PortScan, Arc::new(SlowRunner));
        let app = Application::with_registry(config, registry).await.unwrap();

        let report = app.audit(Task::new(ToolKind::PortScan, "example.com")).await;

        assert_eq!(report.termination, Some(TerminationReason::WallClock));
        assert!(report.stopped_on_budget());
        assert_eq!(report.remaining_tasks.len(), 1);
        assert!(report.logs.iter().any(|e| e.message.contains("timed out")));
    }

    #[tokio::test]
    async fn test_audit_settles() {
        let registry = ToolRegistry::new().with_runner(ToolKind::PortScan, Arc::new(WebHost));
        let app = Application::with_registry(config(), registry).await.unwrap();

        let report = app.audit(Task::new(ToolKind::PortScan, "example.com")).await;

        assert_eq!(report.termination, Some(TerminationReason::Settled));
        assert_eq!(report.iterations, 1);
        assert!(report.remaining_tasks.is_empty());
        assert_eq!(report.metrics.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_run_writes_report_and_skips_dry_run() {
        let temp_dir = TempDir::new().unwrap();
        let report_path = temp_dir.path().join("audit.json");
        let mut config = config();
        config.output.default_format = "json".into();
        let registry = ToolRegistry::new().with_runner(ToolKind::PortScan, Arc::new(WebHost));
        let app = Application::with_registry(config, registry).await.unwrap();

        let cli = Cli::parse_from(["reconflow", "example.com", "--dry-run", "-q"]);
        assert!(app.run(&cli).await.unwrap().is_none());

        let path = report_path.to_string_lossy().to_string();
        let cli = Cli::parse_from(["reconflow", "example.com", "-q", "-o", path.as_str()]);
        let report = app.run(&cli).await.unwrap().unwrap();

        assert_eq!(report.seed_target, "example.com");
        let written = tokio::fs::read_to_string(&report_path).await.unwrap();
        assert!(written.contains("\"seed_target\": \"example.com\""));
    }
}
