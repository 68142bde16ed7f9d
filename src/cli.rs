//! Command-line interface definition
//!
//! Provides CLI argument parsing with support for:
//! - Seed target specification (positional or free-text task)
//! - Scope entries merged with the configuration file
//! - Budget overrides
//! - Report output control

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::{config::AppConfig, task::ToolKind};

#[derive(Parser, Debug)]
#[command(
    name = "reconflow",
    version,
    about = "Scope-aware reconnaissance task orchestrator",
    long_about = "Drives port scanning, directory brute-forcing, parameter fuzzing and injection probing \
                  against an authorized target, deriving each stage from the previous stage's findings"
)]
pub struct Cli {
    /// Seed target (hostname, IP address or URL)
    #[arg(help = "Seed target (e.g., example.com, 192.168.1.10, http://app.example.com)")]
    pub target: Option<String>,

    #[arg(long, help = "Free-text task; the first word containing '.' becomes the target", value_name = "TEXT")]
    pub task: Option<String>,

    #[arg(long, help = "Tool for the seed task (default: port_scan)", value_name = "TOOL")]
    pub tool: Option<ToolKind>,

    // Scope
    #[arg(short = 'd', long = "domain", help = "Authorized domain; prefix with '.' to include subdomains", value_name = "DOMAIN")]
    pub domains: Vec<String>,

    #[arg(short = 'r', long = "ip-range", help = "Authorized network in CIDR notation", value_name = "CIDR")]
    pub ip_ranges: Vec<String>,

    // Budgets
    #[arg(long, help = "Maximum orchestrator iterations", value_name = "N")]
    pub max_iterations: Option<u32>,

    #[arg(long, help = "Maximum retries per failed task", value_name = "N")]
    pub max_retries: Option<u32>,

    #[arg(long, help = "Wall-clock budget for the whole run in seconds", value_name = "SECS")]
    pub run_timeout: Option<u64>,

    #[arg(long, help = "Tool invocations in flight per iteration", value_name = "NUM")]
    pub concurrency: Option<usize>,

    // Output Options
    #[arg(short = 'o', long, help = "Write a report to this file", value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Report format", value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    #[arg(short = 'v', long, help = "Increase verbosity level", action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long, help = "Quiet mode (errors only, no summary)")]
    pub quiet: bool,

    // Configuration
    #[arg(short = 'c', long, help = "Configuration file path", value_name = "FILE", default_value = "reconflow.toml")]
    pub config_path: PathBuf,

    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,

    #[arg(long, help = "Show the scope decision and seed plan without running any tool")]
    pub dry_run: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl Cli {
    /// Validate CLI arguments and resolve conflicts
    pub fn validate(&self) -> Result<(), String> {
        if self.quiet && self.verbose > 0 {
            return Err("Cannot use both quiet and verbose modes".to_string());
        }

        if self.target.is_some() && self.task.is_some() {
            return Err("Give either a target or --task, not both".to_string());
        }

        if !self.validate_config && self.seed_target().is_none() {
            return Err(match &self.task {
                Some(_) => "No target found in task text (expected a word containing '.')".to_string(),
                None => "A target or --task is required".to_string(),
            });
        }

        if self.max_iterations == Some(0) {
            return Err("--max-iterations must be greater than 0".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("--concurrency must be greater than 0".to_string());
        }

        if self.run_timeout == Some(0) {
            return Err("--run-timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// The seed target, from the positional argument or the task text
    pub fn seed_target(&self) -> Option<String> {
        match (&self.target, &self.task) {
            (Some(target), _) => Some(target.trim().to_string()).filter(|t| !t.is_empty()),
            (None, Some(text)) => extract_target(text),
            (None, None) => None,
        }
    }

    pub fn seed_tool(&self) -> ToolKind {
        self.tool.unwrap_or(ToolKind::PortScan)
    }

    /// Log level implied by -v / -q, if any
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        for domain in &self.domains {
            if !config.scope.domains.contains(domain) {
                config.scope.domains.push(domain.clone());
            }
        }
        for range in &self.ip_ranges {
            if !config.scope.ip_ranges.contains(range) {
                config.scope.ip_ranges.push(range.clone());
            }
        }

        if let Some(max_iterations) = self.max_iterations {
            config.orchestrator.max_iterations = max_iterations;
        }
        if let Some(max_retries) = self.max_retries {
            config.orchestrator.max_retries = max_retries;
        }
        if let Some(run_timeout) = self.run_timeout {
            config.orchestrator.run_timeout_secs = run_timeout;
        }
        if let Some(concurrency) = self.concurrency {
            config.orchestrator.max_concurrent_tasks = concurrency;
        }
        if let Some(format) = self.format {
            config.output.default_format = format.to_string();
        }
        if let Some(level) = self.log_level_override() {
            config.logging.level = level.to_string();
        }
    }
}

/// First whitespace-separated word of `text` that contains a `.`
pub fn extract_target(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_start_matches(|c: char| matches!(c, '(' | '"' | '\''))
                .trim_end_matches(|c: char| matches!(c, ',' | ';' | '.' | ')' | '"' | '\'' | '!' | '?'))
        })
        .find(|word| word.contains('.'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_target() {
        let cli = Cli::parse_from(["reconflow", "example.com", "-d", "example.com"]);
        assert!(cli.validate().is_ok());
        assert_eq!(cli.seed_target().as_deref(), Some("example.com"));
        assert_eq!(cli.seed_tool(), ToolKind::PortScan);
    }

    #[test]
    fn test_task_text_target() {
        let cli = Cli::parse_from(["reconflow", "--task", "Scan example.com for open ports"]);
        assert!(cli.validate().is_ok());
        assert_eq!(cli.seed_target().as_deref(), Some("example.com"));

        assert_eq!(extract_target("please audit (app.example.com)."), Some("app.example.com".into()));
        assert_eq!(extract_target("check 10.0.0.5, thanks"), Some("10.0.0.5".into()));
        assert_eq!(extract_target("nothing to see here"), None);
    }

    #[test]
    fn test_missing_target() {
        let cli = Cli::parse_from(["reconflow"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["reconflow", "--task", "scan the server"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["reconflow", "--validate-config"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_conflicting_options() {
        let cli = Cli::parse_from(["reconflow", "example.com", "-q", "-v"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["reconflow", "example.com", "--task", "scan example.com"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["reconflow", "example.com", "--concurrency", "0"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_seed_tool_parsing() {
        let cli = Cli::parse_from(["reconflow", "http://example.com", "--tool", "gobuster"]);
        assert_eq!(cli.seed_tool(), ToolKind::DirectoryBruteForce);
    }

    #[test]
    fn test_overrides_merge_into_config() {
        let cli = Cli::parse_from([
            "reconflow",
            "example.com",
            "-d",
            ".example.com",
            "-r",
            "10.0.0.0/8",
            "--max-iterations",
            "5",
            "--concurrency",
            "3",
            "--format",
            "json",
            "-vv",
        ]);
        let mut config = AppConfig::default();
        config.scope.domains = vec![".example.com".into()];
        cli.apply_overrides(&mut config);

        assert_eq!(config.scope.domains, vec![".example.com".to_string()]);
        assert_eq!(config.scope.ip_ranges, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(config.orchestrator.max_iterations, 5);
        assert_eq!(config.orchestrator.max_retries, 2);
        assert_eq!(config.orchestrator.max_concurrent_tasks, 3);
        assert_eq!(config.output.default_format, "json");
        assert_eq!(config.logging.level, "trace");
    }
}
