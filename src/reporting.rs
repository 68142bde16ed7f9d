//! Report generation and output formatting
//!
//! An [`AuditReport`] is the serializable summary of one run. It can be
//! rendered as JSON or as human-readable text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    contract::{Findings, ToolResult},
    error::{ReconError, Result},
    metrics::MetricsSnapshot,
    orchestrator::{LogEntry, ResultsMap, TerminationReason, WorkflowState},
    task::{Task, ToolKind},
};

/// Everything known about a finished (or halted) run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub seed_target: String,
    pub seed_tool: ToolKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: u32,
    pub termination: Option<TerminationReason>,
    pub scope_domains: Vec<String>,
    pub scope_ip_ranges: Vec<String>,
    /// Tasks still pending when the run stopped on a budget
    pub remaining_tasks: Vec<Task>,
    pub results: ResultsMap,
    pub logs: Vec<LogEntry>,
    pub metrics: MetricsSnapshot,
}

impl AuditReport {
    pub fn from_state(
        run_id: Uuid,
        seed: &Task,
        started_at: DateTime<Utc>,
        state: &WorkflowState,
        metrics: MetricsSnapshot,
    ) -> Self {
        let scope = state.scope.scope();
        Self {
            run_id,
            seed_target: seed.target.clone(),
            seed_tool: seed.tool,
            started_at,
            finished_at: Utc::now(),
            iterations: state.iteration,
            termination: state.termination,
            scope_domains: scope.domains().to_vec(),
            scope_ip_ranges: scope.ip_ranges().iter().map(ToString::to_string).collect(),
            remaining_tasks: state.active_tasks().cloned().collect(),
            results: state.results.clone(),
            logs: state.logs.clone(),
            metrics,
        }
    }

    /// Whether the run stopped on a budget rather than settling
    pub fn stopped_on_budget(&self) -> bool {
        self.termination.map_or(false, |reason| reason.is_budget())
    }
}

#[async_trait]
pub trait ReportGenerator {
    async fn generate_report(&self, report: &AuditReport, format: &str, output_path: &Path) -> Result<()>;
}

pub struct DefaultReportGenerator {
    config: AppConfig,
}

impl DefaultReportGenerator {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReportGenerator for DefaultReportGenerator {
    async fn generate_report(&self, report: &AuditReport, format: &str, output_path: &Path) -> Result<()> {
        let output_path = if output_path.is_relative() && output_path.parent().map_or(true, |p| p.as_os_str().is_empty()) {
            self.config.output.output_dir.join(output_path)
        } else {
            output_path.to_path_buf()
        };

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = match format.to_lowercase().as_str() {
            "json" => generate_json_report(report)?,
            "human" => generate_human_report(report),
            _ => return Err(ReconError::output(format, "Unsupported output format")),
        };

        fs::write(&output_path, content).await?;
        tracing::info!("Report generated: {} ({})", output_path.display(), format);

        Ok(())
    }
}

pub fn generate_json_report(report: &AuditReport) -> Result<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| ReconError::output("json", format!("JSON serialization failed: {}", e)))
}

pub fn generate_human_report(report: &AuditReport) -> String {
    let mut text = String::new();

    text.push_str("# Reconnaissance Report\n\n");
    text.push_str(&format!("Run ID: {}\n", report.run_id));
    text.push_str(&format!("Seed: {} on {}\n", report.seed_tool, report.seed_target));
    text.push_str(&format!("Started: {}\n", report.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    text.push_str(&format!("Finished: {}\n", report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")));
    text.push_str(&format!("Iterations: {}\n", report.iterations));
    text.push_str(&format!(
        "Outcome: {}\n",
        report
            .termination
            .map_or_else(|| "still running".to_string(), |reason| reason.to_string())
    ));
    text.push_str(&format!(
        "Scope: domains [{}], networks [{}]\n\n",
        report.scope_domains.join(", "),
        report.scope_ip_ranges.join(", ")
    ));

    text.push_str("## Results\n\n");
    if report.results.is_empty() {
        text.push_str("No successful scans.\n\n");
    }
    for (target, by_tool) in &report.results {
        text.push_str(&format!("### {}\n\n", target));
        for (tool, result) in by_tool {
            text.push_str(&format!("- {} ({}ms): {}\n", tool, result.duration_ms, summarize(result)));
            text.push_str(&format_findings(&result.findings));
        }
        text.push('\n');
    }

    if !report.remaining_tasks.is_empty() {
        text.push_str("## Unfinished Tasks\n\n");
        for task in &report.remaining_tasks {
            text.push_str(&format!("- {} (retry {})\n", task, task.retry_count));
        }
        text.push('\n');
    }

    let m = &report.metrics;
    text.push_str("## Metrics\n\n");
    text.push_str(&format!(
        "dispatched {}, completed {}, failed {}, retried {}, derived {}, scope rejections {}\n\n",
        m.tasks_dispatched, m.tasks_completed, m.tasks_failed, m.tasks_retried, m.tasks_derived, m.scope_rejections
    ));

    text.push_str("## Log\n\n");
    for entry in &report.logs {
        text.push_str(&format!("{}\n", entry));
    }

    text
}

fn summarize(result: &ToolResult) -> String {
    match &result.findings {
        Findings::None => "no findings".to_string(),
        Findings::Ports(_) => format!("{} open ports", result.findings.count()),
        Findings::Paths(paths) => format!("{} paths", paths.len()),
        Findings::Parameters(params) => format!("{} parameters", params.len()),
        Findings::Injection { vulnerable: true, .. } => "VULNERABLE to injection".to_string(),
        Findings::Injection { vulnerable: false, .. } => "no injection found".to_string(),
    }
}

fn format_findings(findings: &Findings) -> String {
    let mut text = String::new();
    match findings {
        Findings::Ports(ports) => {
            for port in ports {
                text.push_str(&format!(
                    "    {}/{} {}\n",
                    port.port,
                    port.state,
                    port.service.as_deref().unwrap_or("unknown")
                ));
            }
        }
        Findings::Paths(items) | Findings::Parameters(items) => {
            for item in items {
                text.push_str(&format!("    {}\n", item));
            }
        }
        Findings::Injection { log_ref: Some(log_ref), .. } => {
            text.push_str(&format!("    log: {}\n", log_ref));
        }
        Findings::Injection { .. } | Findings::None => {}
    }
    text
}

pub async fn create_report_generator(config: &AppConfig) -> Result<Box<dyn ReportGenerator + Send + Sync>> {
    Ok(Box::new(DefaultReportGenerator::new(config.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contract::PortFinding,
        orchestrator::{Orchestrator, OrchestratorPolicy},
        runner::ToolRegistry,
        scope::{ScopeDefinition, ScopeValidator},
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_report() -> AuditReport {
        let scope = ScopeDefinition::new(&["example.com"], &["10.0.0.0/8"]).unwrap();
        let orchestrator = Orchestrator::new(OrchestratorPolicy::default(), ToolRegistry::new());
        let seed = Task::new(ToolKind::PortScan, "example.com");
        let mut state = orchestrator.initialize(vec![seed.clone()], Arc::new(ScopeValidator::new(scope)));

        let mut by_tool = std::collections::BTreeMap::new();
        by_tool.insert(
            ToolKind::PortScan,
            ToolResult::success(Findings::Ports(vec![PortFinding::open(443, Some("https"))])),
        );
        state.results.insert("example.com".to_string(), by_tool);

        AuditReport::from_state(Uuid::new_v4(), &seed, Utc::now(), &state, orchestrator.metrics())
    }

    #[test]
    fn test_human_report_lists_results() {
        let report = sample_report();
        let text = generate_human_report(&report);

        assert!(text.contains("# Reconnaissance Report"));
        assert!(text.contains("### example.com"));
        assert!(text.contains("443/open https"));
        assert!(text.contains("10.0.0.0/8"));
        assert!(text.contains("## Unfinished Tasks"));
    }

    #[test]
    fn test_json_report_is_parseable() {
        let report = sample_report();
        let json = generate_json_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["seed_target"], "example.com");
        assert_eq!(value["seed_tool"], "port_scan");
        assert!(value["results"]["example.com"]["port_scan"]["success"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn test_generate_report_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("report.json");
        let generator = DefaultReportGenerator::new(AppConfig::default());

        generator.generate_report(&sample_report(), "json", &path).await.unwrap();
        assert!(path.exists());

        let result = generator.generate_report(&sample_report(), "xml", &path).await;
        assert!(matches!(result, Err(ReconError::Output { .. })));
    }

    #[tokio::test]
    async fn test_bare_file_name_goes_to_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.output.output_dir = temp_dir.path().join("reports");
        let generator = DefaultReportGenerator::new(config);

        generator
            .generate_report(&sample_report(), "human", Path::new("audit.txt"))
            .await
            .unwrap();

        let written = temp_dir.path().join("reports").join("audit.txt");
        assert!(written.exists());
        let text = std::fs::read_to_string(written).unwrap();
        assert!(text.starts_with("# Reconnaissance Report\n\n"));
        assert!(!Path::new("audit.txt").exists());
    }

    #[test]
    fn test_human_report_lists_findings() {
        let mut report = sample_report();
        let mut by_tool = std::collections::BTreeMap::new();
        by_tool.insert(
            ToolKind::InjectionProbe,
            ToolResult::success(Findings::Injection {
                vulnerable: true,
                log_ref: Some("/tmp/sqlmap.log".into()),
            }),
        );
        report.results.insert("http://example.com".to_string(), by_tool);

        let text = generate_human_report(&report);
        assert!(text.contains("VULNERABLE to injection\n"));
        assert!(text.contains("    log: /tmp/sqlmap.log\n"));
    }
}
