//! Configuration management system
//!
//! Provides centralized configuration management with support for:
//! - TOML configuration files
//! - Environment variables (`RECONFLOW__SECTION__KEY`)
//! - Command-line overrides applied by the driver

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::{
    orchestrator::OrchestratorPolicy,
    scope::ScopeDefinition,
    task::ToolKind,
};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Iteration, retry and time budgets
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Authorization scope
    #[serde(default)]
    pub scope: ScopeConfig,
    /// Per-tool commands and timeouts
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Report output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Iterations allowed before the run is stopped
    pub max_iterations: u32,
    /// Retries per task after the first attempt
    pub max_retries: u32,
    /// Tool invocations dispatched at once within an iteration
    pub max_concurrent_tasks: usize,
    /// Wall-clock budget for the whole run in seconds
    pub run_timeout_secs: u64,
    /// Pause between iterations in milliseconds
    pub step_delay_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_retries: 2,
            max_concurrent_tasks: 1,
            run_timeout_secs: 300,
            step_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Exact domains, or suffixes with a leading `.` (or `*.`)
    pub domains: Vec<String>,
    /// CIDR networks
    pub ip_ranges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Invocation timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Adapter command; `{target}` is replaced by the task target.
    /// An empty command leaves the tool without a runner.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_tool_timeout_secs() -> u64 {
    ToolKind::PortScan.default_timeout().as_secs()
}

impl ToolConfig {
    fn with_timeout(tool: ToolKind) -> Self {
        Self {
            timeout_secs: tool.default_timeout().as_secs(),
            command: Vec::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub port_scan: ToolConfig,
    pub directory_brute_force: ToolConfig,
    pub parameter_fuzz: ToolConfig,
    pub injection_probe: ToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            port_scan: ToolConfig::with_timeout(ToolKind::PortScan),
            directory_brute_force: ToolConfig::with_timeout(ToolKind::DirectoryBruteForce),
            parameter_fuzz: ToolConfig::with_timeout(ToolKind::ParameterFuzz),
            injection_probe: ToolConfig::with_timeout(ToolKind::InjectionProbe),
        }
    }
}

impl ToolsConfig {
    pub fn for_tool(&self, tool: ToolKind) -> &ToolConfig {
        match tool {
            ToolKind::PortScan => &self.port_scan,
            ToolKind::DirectoryBruteForce => &self.directory_brute_force,
            ToolKind::ParameterFuzz => &self.parameter_fuzz,
            ToolKind::InjectionProbe => &self.injection_probe,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
    /// Log file path (None for stderr only)
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default report format (human, json)
    pub default_format: String,
    /// Directory used when a report path is relative
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "human".to_string(),
            output_dir: PathBuf::from("./recon_results"),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub async fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        info!("Loading configuration from: {}", config_path.display());

        let mut settings = config::Config::builder();

        // Start with default configuration
        settings = settings.add_source(config::Config::try_from(&Self::default())?);

        if config_path.exists() {
            debug!("Found configuration file, loading settings");
            settings = settings.add_source(config::File::from(config_path));
        } else {
            info!("No configuration file found, using defaults");
            Self::create_default_config(config_path).await?;
        }

        settings = settings.add_source(
            config::Environment::with_prefix("RECONFLOW")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scope.domains")
                .with_list_parse_key("scope.ip_ranges")
                .try_parsing(true),
        );

        let config: AppConfig = settings
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Create a default configuration file
    async fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let config_content = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default configuration")?;

        tokio::fs::write(path, config_content)
            .await
            .context("Failed to write default configuration file")?;

        info!("Created default configuration file: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_iterations == 0 {
            return Err(anyhow::anyhow!("max_iterations must be greater than 0"));
        }

        if self.orchestrator.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("max_concurrent_tasks must be greater than 0"));
        }

        if self.orchestrator.run_timeout_secs == 0 {
            return Err(anyhow::anyhow!("run_timeout_secs must be greater than 0"));
        }

        for tool in ToolKind::ALL {
            if self.tools.for_tool(tool).timeout_secs == 0 {
                return Err(anyhow::anyhow!("{} timeout must be greater than 0", tool));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow::anyhow!("Invalid logging level: {}", self.logging.level)),
        }

        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "compact" | "json" => {}
            _ => return Err(anyhow::anyhow!("Invalid logging format: {}", self.logging.format)),
        }

        match self.output.default_format.to_lowercase().as_str() {
            "human" | "json" => {}
            _ => return Err(anyhow::anyhow!("Invalid output format: {}", self.output.default_format)),
        }

        // Malformed CIDRs surface here rather than at the first scan
        self.scope_definition()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Build the authorization scope described by the `scope` section
    pub fn scope_definition(&self) -> crate::error::Result<ScopeDefinition> {
        ScopeDefinition::new(&self.scope.domains, &self.scope.ip_ranges)
    }

    /// Orchestrator budgets derived from this configuration
    pub fn policy(&self) -> OrchestratorPolicy {
        OrchestratorPolicy {
            max_iterations: self.orchestrator.max_iterations,
            max_retries: self.orchestrator.max_retries,
            max_concurrent_tasks: self.orchestrator.max_concurrent_tasks,
        }
    }

    /// Wall-clock budget for a run
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.run_timeout_secs)
    }

    /// Pause inserted between iterations
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.orchestrator.step_delay_ms)
    }
}
