//! Result contract between tool runners and the orchestrator
//!
//! Runners hand back a [`ToolResult`]. External adapters speak JSON; the
//! [`parse_tool_output`] entry point turns that JSON into a `ToolResult`
//! and never fails: anything missing or malformed becomes a failed result
//! with a descriptive error.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::ToolKind;

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub error: Option<String>,
    pub findings: Findings,
    pub duration_ms: u64,
}

/// Tool-specific payload consumed by the derivation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Findings {
    None,
    Ports(Vec<PortFinding>),
    Paths(Vec<String>),
    Parameters(Vec<String>),
    Injection {
        vulnerable: bool,
        log_ref: Option<String>,
    },
}

impl Findings {
    /// Whether this payload is the one `tool` is expected to produce
    pub fn matches(&self, tool: ToolKind) -> bool {
        matches!(
            (tool, self),
            (ToolKind::PortScan, Findings::Ports(_))
                | (ToolKind::DirectoryBruteForce, Findings::Paths(_))
                | (ToolKind::ParameterFuzz, Findings::Parameters(_))
                | (ToolKind::InjectionProbe, Findings::Injection { .. })
        )
    }

    /// Number of individual findings, for summaries
    pub fn count(&self) -> usize {
        match self {
            Findings::None => 0,
            Findings::Ports(ports) => ports.iter().filter(|p| p.state == PortState::Open).count(),
            Findings::Paths(paths) => paths.len(),
            Findings::Parameters(params) => params.len(),
            Findings::Injection { vulnerable, .. } => usize::from(*vulnerable),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortFinding {
    pub port: u16,
    pub state: PortState,
    pub service: Option<String>,
}

impl PortFinding {
    pub fn open(port: u16, service: Option<&str>) -> Self {
        Self {
            port,
            state: PortState::Open,
            service: service.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "filtered" | "open|filtered" | "closed|filtered" => Some(Self::Filtered),
            _ => None,
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToolResult {
    pub fn success(findings: Findings) -> Self {
        Self {
            success: true,
            error: None,
            findings,
            duration_ms: 0,
        }
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            findings: Findings::None,
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// Error text for a failed result
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Scan failed")
    }

    /// Enforce the contract for `tool`: a success must carry that tool's
    /// findings, otherwise it is downgraded to a failure.
    pub fn validated_for(self, tool: ToolKind) -> Self {
        if !self.success {
            return self;
        }
        if self.findings.matches(tool) {
            return self;
        }
        Self {
            success: false,
            error: Some(format!("{} returned findings of the wrong kind", tool)),
            findings: Findings::None,
            duration_ms: self.duration_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    success: Option<bool>,
    error: Option<String>,
    ports: Option<Vec<RawPort>>,
    #[serde(alias = "paths")]
    directories: Option<Vec<String>>,
    parameters: Option<Vec<String>>,
    vulnerable: Option<bool>,
    #[serde(alias = "log_ref")]
    log_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPort {
    #[serde(alias = "portid")]
    port: Option<PortNumber>,
    state: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortNumber {
    Number(u64),
    Text(String),
}

impl PortNumber {
    fn to_port(&self) -> Option<u16> {
        match self {
            PortNumber::Number(n) => u16::try_from(*n).ok(),
            PortNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Parse a tool adapter's JSON output into a result for `tool`
pub fn parse_tool_output(tool: ToolKind, raw: &str) -> ToolResult {
    let raw = raw.trim();
    if raw.is_empty() {
        return ToolResult::failure(format!("{} produced no output", tool));
    }

    let output: RawOutput = match serde_json::from_str(raw) {
        Ok(output) => output,
        Err(e) => return ToolResult::failure(format!("{} output is not valid JSON: {}", tool, e)),
    };

    match output.success {
        None => return ToolResult::failure(format!("{} output is missing `success`", tool)),
        Some(false) => {
            return ToolResult::failure(output.error.unwrap_or_else(|| "Scan failed".to_string()))
        }
        Some(true) => {}
    }

    let findings = match tool {
        ToolKind::PortScan => {
            let Some(raw_ports) = output.ports else {
                return ToolResult::failure("port scan output is missing `ports`");
            };
            let mut ports = Vec::with_capacity(raw_ports.len());
            for (index, raw_port) in raw_ports.iter().enumerate() {
                match convert_port(raw_port) {
                    Ok(port) => ports.push(port),
                    Err(reason) => {
                        return ToolResult::failure(format!("port entry {}: {}", index, reason))
                    }
                }
            }
            Findings::Ports(ports)
        }
        ToolKind::DirectoryBruteForce => match output.directories {
            Some(paths) => Findings::Paths(paths),
            None => return ToolResult::failure("directory scan output is missing `directories`"),
        },
        ToolKind::ParameterFuzz => match output.parameters {
            Some(params) => Findings::Parameters(params),
            None => return ToolResult::failure("parameter fuzz output is missing `parameters`"),
        },
        ToolKind::InjectionProbe => match output.vulnerable {
            Some(vulnerable) => Findings::Injection {
                vulnerable,
                log_ref: output.log_path,
            },
            None => return ToolResult::failure("injection probe output is missing `vulnerable`"),
        },
    };

    ToolResult::success(findings)
}

fn convert_port(raw: &RawPort) -> std::result::Result<PortFinding, String> {
    let port = raw
        .port
        .as_ref()
        .ok_or_else(|| "missing `port`".to_string())?
        .to_port()
        .ok_or_else(|| "`port` is not a valid port number".to_string())?;
    let state = raw.state.as_deref().ok_or_else(|| "missing `state`".to_string())?;
    let state = PortState::parse(state).ok_or_else(|| format!("unknown port state `{}`", state))?;
    let service = raw
        .service
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "unknown")
        .map(str::to_string);

    Ok(PortFinding { port, state, service })
}
