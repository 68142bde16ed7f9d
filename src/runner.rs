//! Tool runner boundary
//!
//! A [`ToolRunner`] executes one scan and reports the outcome as a
//! [`ToolResult`]; it never returns an error across this boundary.
//! [`ToolRegistry`] is the lookup table from [`ToolKind`] to the runner and
//! timeout used for it. [`ProcessToolRunner`] adapts any external command
//! that prints the JSON result contract on stdout.

use async_trait::async_trait;
use std::{collections::HashMap, process::Stdio, sync::Arc, time::Duration, time::Instant};
use tokio::{process::Command, time::timeout};
use tracing::debug;

use crate::{
    config::ToolsConfig,
    contract::{parse_tool_output, ToolResult},
    error::{ErrorContext, ReconError, Result},
    task::ToolKind,
};

/// Placeholder replaced by the task target in command templates
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Executes a scan of a single kind
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run against `target`, giving up after `timeout`
    async fn run(&self, target: &str, timeout: Duration) -> ToolResult;

    /// Human readable runner description
    fn describe(&self) -> String;
}

/// Runner and timeout bound to one tool kind
#[derive(Clone)]
pub struct ToolBinding {
    pub runner: Arc<dyn ToolRunner>,
    pub timeout: Duration,
}

/// Lookup table from tool kind to its binding
#[derive(Clone, Default)]
pub struct ToolRegistry {
    bindings: HashMap<ToolKind, ToolBinding>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build process runners for every tool with a configured command
    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        let mut registry = Self::new();
        for tool in ToolKind::ALL {
            let tool_config = config.for_tool(tool);
            if tool_config.command.is_empty() {
                debug!(tool = tool.as_str(), "No command configured, tool disabled");
                continue;
            }
            let runner = ProcessToolRunner::new(tool, tool_config.command.clone())?;
            registry.bind(tool, Arc::new(runner), tool_config.timeout());
        }
        Ok(registry)
    }

    pub fn bind(&mut self, tool: ToolKind, runner: Arc<dyn ToolRunner>, timeout: Duration) {
        self.bindings.insert(tool, ToolBinding { runner, timeout });
    }

    /// Builder form of [`ToolRegistry::bind`] using the tool's default timeout
    pub fn with_runner(mut self, tool: ToolKind, runner: Arc<dyn ToolRunner>) -> Self {
        self.bind(tool, runner, tool.default_timeout());
        self
    }

    pub fn binding(&self, tool: ToolKind) -> Option<&ToolBinding> {
        self.bindings.get(&tool)
    }

    pub fn timeout_for(&self, tool: ToolKind) -> Duration {
        self.binding(tool)
            .map(|binding| binding.timeout)
            .unwrap_or_else(|| tool.default_timeout())
    }

    /// Tools that have a runner bound, in canonical order
    pub fn available_tools(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|tool| self.bindings.contains_key(tool))
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for tool in self.available_tools() {
            if let Some(binding) = self.bindings.get(&tool) {
                map.entry(&tool.as_str(), &binding.runner.describe());
            }
        }
        map.finish()
    }
}

/// Runs an external command and parses its stdout with the result contract
#[derive(Debug, Clone)]
pub struct ProcessToolRunner {
    tool: ToolKind,
    program: String,
    args: Vec<String>,
}

impl ProcessToolRunner {
    pub fn new(tool: ToolKind, command: Vec<String>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ReconError::config(format!("Empty command for {}", tool)))?;
        let args: Vec<String> = parts.collect();
        if program.contains(TARGET_PLACEHOLDER) {
            return Err(ReconError::config(format!(
                "Command for {} must not put {} in the program position",
                tool, TARGET_PLACEHOLDER
            )));
        }

        Ok(Self { tool, program, args })
    }

    fn render_args(&self, target: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(TARGET_PLACEHOLDER, target))
            .collect()
    }

    async fn execute(&self, target: &str, limit: Duration) -> Result<ToolResult> {
        let tool = self.tool.as_str();
        let child = Command::new(&self.program)
            .args(self.render_args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_tool_context(tool, target)?;

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(output) => output.with_tool_context(tool, target)?,
            Err(_) => return Err(ReconError::timeout(format!("{} on {}", tool, target), limit.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReconError::tool(
                tool,
                target,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tool_output(self.tool, &stdout))
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, target: &str, timeout: Duration) -> ToolResult {
        let started = Instant::now();
        debug!(tool = self.tool.as_str(), target = %target, program = %self.program, "Spawning tool process");

        let result = match self.execute(target, timeout).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(e.to_string()),
        };
        result.with_duration(started.elapsed())
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}
