//! Error handling for the reconnaissance orchestrator
//!
//! Provides structured error types with contextual information for:
//! - Scope errors (malformed policy entries, unauthorized targets)
//! - Task errors (invalid targets, tool execution failures, timeouts)
//! - Run-level budget exhaustion
//! - Configuration, IO and output errors

use std::{fmt, io};
use thiserror::Error;

/// Main result type used throughout the application
pub type Result<T> = std::result::Result<T, ReconError>;

/// Error enum covering every failure the orchestrator can observe
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ReconError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A scope entry could not be parsed when building the policy
    #[error("Invalid scope entry: {entry} - {reason}")]
    InvalidScope { entry: String, reason: String },

    /// Target is not covered by the authorization scope
    #[error("Scope violation: {target} is not authorized")]
    ScopeViolation { target: String },

    /// Target failed the structural pre-check
    #[error("Invalid target: {target} - {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Transport, launch or parse failure reported by a tool runner
    #[error("Tool error: {tool} on {target} - {message}")]
    ToolExecution {
        tool: String,
        target: String,
        message: String,
    },

    /// Timeout errors with contextual information
    #[error("Timeout: {operation} after {duration_secs}s")]
    Timeout {
        operation: String,
        duration_secs: u64,
    },

    /// Iteration or wall-clock budget reached
    #[error("Budget exhausted: {budget} (limit {limit})")]
    BudgetExhausted { budget: String, limit: u64 },

    /// Validation errors for user input
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Report generation errors
    #[error("Output error: {format} - {message}")]
    Output { format: String, message: String },

    /// File I/O errors
    #[error("IO error: {operation} - {message}")]
    Io { operation: String, message: String },

    /// Generic internal errors with context
    #[error("Internal error: {context} - {message}")]
    Internal { context: String, message: String },
}

impl ReconError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid scope entry error
    pub fn invalid_scope<E: Into<String>, R: Into<String>>(entry: E, reason: R) -> Self {
        Self::InvalidScope {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Create a scope violation error
    pub fn scope_violation<T: Into<String>>(target: T) -> Self {
        Self::ScopeViolation {
            target: target.into(),
        }
    }

    /// Create an invalid target error
    pub fn invalid_target<T: Into<String>, R: Into<String>>(target: T, reason: R) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool<T: Into<String>, G: Into<String>, M: Into<String>>(
        tool: T,
        target: G,
        message: M,
    ) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<O: Into<String>>(operation: O, duration_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_secs,
        }
    }

    /// Create a budget exhaustion error
    pub fn budget<B: Into<String>>(budget: B, limit: u64) -> Self {
        Self::BudgetExhausted {
            budget: budget.into(),
            limit,
        }
    }

    /// Create a validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output<F: Into<String>, M: Into<String>>(format: F, message: M) -> Self {
        Self::Output {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Io {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<C: Into<String>, M: Into<String>>(context: C, message: M) -> Self {
        Self::Internal {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Check if error is recoverable (the failed task may be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ToolExecution { .. } | Self::Timeout { .. })
    }

    /// Check if error is an authorization issue
    pub fn is_scope_error(&self) -> bool {
        matches!(self, Self::ScopeViolation { .. } | Self::InvalidScope { .. })
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::ScopeViolation { .. } => "scope_violation",
            Self::InvalidTarget { .. } => "invalid_target",
            Self::ToolExecution { .. } => "tool_execution",
            Self::Timeout { .. } => "timeout",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Validation { .. } => "validation",
            Self::Output { .. } => "output",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Internal { .. } => ErrorSeverity::Critical,
            Self::ScopeViolation { .. } | Self::InvalidScope { .. } => ErrorSeverity::High,
            Self::Configuration { .. } | Self::Validation { .. } => ErrorSeverity::High,
            Self::BudgetExhausted { .. } => ErrorSeverity::Medium,
            Self::ToolExecution { .. } | Self::Timeout { .. } => ErrorSeverity::Medium,
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::InvalidTarget { .. } | Self::Output { .. } => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl From<io::Error> for ReconError {
    fn from(error: io::Error) -> Self {
        Self::io("IO operation", error.to_string())
    }
}

impl From<serde_json::Error> for ReconError {
    fn from(error: serde_json::Error) -> Self {
        Self::output("JSON", error.to_string())
    }
}

impl From<config::ConfigError> for ReconError {
    fn from(error: config::ConfigError) -> Self {
        Self::config(error.to_string())
    }
}

impl From<ipnetwork::IpNetworkError> for ReconError {
    fn from(error: ipnetwork::IpNetworkError) -> Self {
        Self::invalid_scope("ip range", error.to_string())
    }
}

/// Adds tool context to lower-level failures
pub trait ErrorContext<T> {
    fn with_tool_context(self, tool: &str, target: &str) -> Result<T>;
}

impl<T, E: Into<ReconError>> ErrorContext<T> for std::result::Result<T, E> {
    fn with_tool_context(self, tool: &str, target: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            ReconError::Io { message, .. } => ReconError::tool(tool, target, message),
            ReconError::Output { message, .. } => {
                ReconError::tool(tool, target, format!("malformed output: {}", message))
            }
            other => other,
        })
    }
}
