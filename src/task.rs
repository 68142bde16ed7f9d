//! Task model: tool kinds, lifecycle status and the retry transition

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use uuid::Uuid;

use crate::{
    contract::ToolResult,
    error::{ReconError, Result},
};

/// The closed set of scan stages the orchestrator knows how to sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    PortScan,
    DirectoryBruteForce,
    ParameterFuzz,
    InjectionProbe,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        Self::PortScan,
        Self::DirectoryBruteForce,
        Self::ParameterFuzz,
        Self::InjectionProbe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PortScan => "port_scan",
            Self::DirectoryBruteForce => "directory_brute_force",
            Self::ParameterFuzz => "parameter_fuzz",
            Self::InjectionProbe => "injection_probe",
        }
    }

    /// Policy default for a single invocation of this tool
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::PortScan => Duration::from_secs(120),
            Self::DirectoryBruteForce => Duration::from_secs(180),
            Self::ParameterFuzz => Duration::from_secs(180),
            Self::InjectionProbe => Duration::from_secs(300),
        }
    }
}

impl FromStr for ToolKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "port_scan" | "portscan" | "nmap" => Ok(Self::PortScan),
            "directory_brute_force" | "dir_brute" | "gobuster" => Ok(Self::DirectoryBruteForce),
            "parameter_fuzz" | "param_fuzz" | "ffuf" => Ok(Self::ParameterFuzz),
            "injection_probe" | "sqli" | "sqlmap" => Ok(Self::InjectionProbe),
            _ => Err(ReconError::validation("tool", format!("Unknown tool: {}", s))),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle. Status only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Pending or running
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled invocation of a tool against a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub tool: ToolKind,
    pub target: String,
    status: TaskStatus,
    pub retry_count: u32,
    /// Task whose findings produced this one, or the failed attempt it replaces
    pub parent: Option<Uuid>,
    pub result: Option<ToolResult>,
    pub error: Option<ReconError>,
}

impl Task {
    pub fn new<S: Into<String>>(tool: ToolKind, target: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool,
            target: target.into(),
            status: TaskStatus::Pending,
            retry_count: 0,
            parent: None,
            result: None,
            error: None,
        }
    }

    /// A new pending task spawned from the findings of `parent`
    pub fn derived_from<S: Into<String>>(parent: &Task, tool: ToolKind, target: S) -> Self {
        Self {
            parent: Some(parent.id),
            ..Self::new(tool, target)
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn start(&mut self) -> Result<()> {
        self.advance(TaskStatus::Running)
    }

    pub fn complete(&mut self, result: ToolResult) -> Result<()> {
        self.advance(TaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: ReconError, result: Option<ToolResult>) -> Result<()> {
        self.advance(TaskStatus::Failed)?;
        self.error = Some(error);
        self.result = result;
        Ok(())
    }

    fn advance(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(ReconError::internal(
                "task lifecycle",
                format!(
                    "{} task {} cannot move from {} to {}",
                    self.tool, self.id, self.status, next
                ),
            ));
        }
        self.status = next;
        Ok(())
    }

    /// Next generation of a failed task, if the retry policy allows one.
    ///
    /// Only failed tasks with a recoverable error and `retry_count` below
    /// `max_retries` produce a successor. The successor is a fresh pending
    /// task; the failed original is left untouched for the caller to drop.
    pub fn next_attempt(&self, max_retries: u32) -> Option<Task> {
        if self.status != TaskStatus::Failed || self.retry_count >= max_retries {
            return None;
        }
        if !self.error.as_ref().map_or(true, ReconError::is_recoverable) {
            return None;
        }

        Some(Task {
            id: Uuid::new_v4(),
            tool: self.tool,
            target: self.target.clone(),
            status: TaskStatus::Pending,
            retry_count: self.retry_count + 1,
            parent: Some(self.id),
            result: None,
            error: None,
        })
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} [{}]", self.tool, self.target, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(error: ReconError, retry_count: u32) -> Task {
        let mut task = Task::new(ToolKind::PortScan, "example.com");
        task.retry_count = retry_count;
        task.start().unwrap();
        task.fail(error, None).unwrap();
        task
    }

    #[test]
    fn test_tool_kind_parsing() {
        assert_eq!("nmap".parse::<ToolKind>().unwrap(), ToolKind::PortScan);
        assert_eq!("gobuster".parse::<ToolKind>().unwrap(), ToolKind::DirectoryBruteForce);
        assert_eq!("parameter_fuzz".parse::<ToolKind>().unwrap(), ToolKind::ParameterFuzz);
        assert_eq!("SQLMAP".parse::<ToolKind>().unwrap(), ToolKind::InjectionProbe);
        assert!("nikto".parse::<ToolKind>().is_err());
    }

    #[test]
    fn test_default_timeouts() {
        assert_eq!(ToolKind::PortScan.default_timeout(), Duration::from_secs(120));
        assert_eq!(ToolKind::DirectoryBruteForce.default_timeout(), Duration::from_secs(180));
        assert_eq!(ToolKind::ParameterFuzz.default_timeout(), Duration::from_secs(180));
        assert_eq!(ToolKind::InjectionProbe.default_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut task = Task::new(ToolKind::PortScan, "example.com");
        assert!(task.complete(ToolResult::failure("nope")).is_err());

        task.start().unwrap();
        assert!(task.start().is_err());

        task.complete(ToolResult::failure("done")).unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert!(task.fail(ReconError::timeout("x", 1), None).is_err());
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[test]
    fn test_next_attempt_clones_with_incremented_retry() {
        let task = failed(ReconError::tool("port_scan", "example.com", "boom"), 0);
        let retry = task.next_attempt(2).unwrap();

        assert_eq!(retry.status(), TaskStatus::Pending);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.parent, Some(task.id));
        assert_ne!(retry.id, task.id);
        assert!(retry.error.is_none());
    }

    #[test]
    fn test_next_attempt_respects_max_retries() {
        let task = failed(ReconError::timeout("port_scan", 120), 2);
        assert!(task.next_attempt(2).is_none());

        let task = failed(ReconError::timeout("port_scan", 120), 1);
        assert_eq!(task.next_attempt(2).unwrap().retry_count, 2);
    }

    #[test]
    fn test_terminal_errors_are_not_retried() {
        let task = failed(ReconError::scope_violation("evil.com"), 0);
        assert!(task.next_attempt(2).is_none());

        let task = failed(ReconError::invalid_target("localhost", "no dot"), 0);
        assert!(task.next_attempt(2).is_none());
    }

    #[test]
    fn test_only_failed_tasks_retry() {
        let task = Task::new(ToolKind::PortScan, "example.com");
        assert!(task.next_attempt(2).is_none());
    }
}
