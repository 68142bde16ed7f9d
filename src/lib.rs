//! # reconflow - scope-aware reconnaissance orchestrator
//!
//! Drives a multi-stage reconnaissance pipeline against one target. Each
//! stage's findings decide the next stage:
//!
//! - **Port scan**: an open web port spawns directory brute-forcing and
//!   parameter fuzzing against the web root
//! - **Directory brute-force**: discovered paths spawn an injection probe
//! - **Parameter fuzz / injection probe**: leaves
//!
//! Every target is checked against an authorization scope before a tool
//! runs. Failed tool invocations are retried a bounded number of times, and
//! the run stops once nothing is left to do or an iteration or wall-clock
//! budget is spent.
//!
//! ## Architecture
//!
//! - [`scope`]: authorization decisions
//! - [`task`]: task model and lifecycle
//! - [`contract`]: tool result contract and its JSON wire form
//! - [`runner`]: the `ToolRunner` boundary and the tool registry
//! - [`derivation`]: follow-up rules between stages
//! - [`orchestrator`]: the iteration state machine
//! - [`core`]: the application driver

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metrics;

// Orchestration
pub mod contract;
pub mod derivation;
pub mod orchestrator;
pub mod runner;
pub mod scope;
pub mod task;

// Output and reporting
pub mod reporting;

// Re-exports for convenience
pub use crate::{
    config::AppConfig,
    contract::{Findings, PortFinding, PortState, ToolResult},
    core::Application,
    error::{ReconError, Result},
    orchestrator::{Orchestrator, OrchestratorPolicy, TerminationReason, WorkflowState},
    runner::{ToolRegistry, ToolRunner},
    scope::{ScopeDefinition, ScopeValidator},
    task::{Task, TaskStatus, ToolKind},
};
