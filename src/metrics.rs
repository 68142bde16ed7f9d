//! Run metrics
//!
//! Counts what the orchestrator did during a run. Every counter is kept
//! locally (for reports) and forwarded to the `metrics` facade, which is a
//! no-op unless the embedding binary installs a recorder.

use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use crate::{error::ReconError, task::ToolKind};

/// Atomic counters for one orchestrator
#[derive(Debug)]
pub struct RunMetrics {
    started: Instant,
    iterations: AtomicU64,
    tasks_dispatched: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_retried: AtomicU64,
    tasks_derived: AtomicU64,
    scope_rejections: AtomicU64,
    tool_time_ms: AtomicU64,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            iterations: AtomicU64::new(0),
            tasks_dispatched: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_retried: AtomicU64::new(0),
            tasks_derived: AtomicU64::new(0),
            scope_rejections: AtomicU64::new(0),
            tool_time_ms: AtomicU64::new(0),
        }
    }

    pub fn record_iteration(&self, iteration: u32, active_tasks: usize) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        counter!("recon_iterations_total", 1);
        gauge!("recon_active_tasks", active_tasks as f64);
        gauge!("recon_iteration", iteration as f64);
    }

    pub fn record_dispatch(&self, tool: ToolKind) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
        counter!("recon_tasks_dispatched_total", 1, "tool" => tool.as_str());
    }

    pub fn record_completion(&self, tool: ToolKind, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.tool_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        counter!("recon_tasks_completed_total", 1, "tool" => tool.as_str());
        histogram!("recon_tool_duration_seconds", duration.as_secs_f64(), "tool" => tool.as_str());
    }

    pub fn record_failure(&self, tool: ToolKind, error: &ReconError) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        if error.is_scope_error() {
            self.scope_rejections.fetch_add(1, Ordering::Relaxed);
        }
        counter!(
            "recon_tasks_failed_total", 1,
            "tool" => tool.as_str(),
            "kind" => error.kind(),
            "recoverable" => if error.is_recoverable() { "true" } else { "false" }
        );
    }

    pub fn record_retry(&self, tool: ToolKind) {
        self.tasks_retried.fetch_add(1, Ordering::Relaxed);
        counter!("recon_tasks_retried_total", 1, "tool" => tool.as_str());
    }

    pub fn record_derived(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.tasks_derived.fetch_add(count as u64, Ordering::Relaxed);
        counter!("recon_tasks_derived_total", count as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_retried: self.tasks_retried.load(Ordering::Relaxed),
            tasks_derived: self.tasks_derived.load(Ordering::Relaxed),
            scope_rejections: self.scope_rejections.load(Ordering::Relaxed),
            tool_time_ms: self.tool_time_ms.load(Ordering::Relaxed),
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Point-in-time copy of [`RunMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub iterations: u64,
    pub tasks_dispatched: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_derived: u64,
    pub scope_rejections: u64,
    pub tool_time_ms: u64,
    pub uptime_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = RunMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.iterations, 0);
        assert_eq!(snapshot.tasks_completed, 0);
        assert_eq!(snapshot.tasks_failed, 0);
    }

    #[test]
    fn test_failure_classification() {
        let metrics = RunMetrics::new();
        metrics.record_failure(ToolKind::PortScan, &ReconError::scope_violation("evil.com"));
        metrics.record_failure(ToolKind::PortScan, &ReconError::timeout("port_scan", 120));
        metrics.record_retry(ToolKind::PortScan);
        metrics.record_derived(0);
        metrics.record_derived(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_failed, 2);
        assert_eq!(snapshot.scope_rejections, 1);
        assert_eq!(snapshot.tasks_retried, 1);
        assert_eq!(snapshot.tasks_derived, 2);
    }

    #[test]
    fn test_completion_accumulates_tool_time() {
        let metrics = RunMetrics::new();
        metrics.record_dispatch(ToolKind::ParameterFuzz);
        metrics.record_completion(ToolKind::ParameterFuzz, Duration::from_millis(250));
        metrics.record_completion(ToolKind::ParameterFuzz, Duration::from_millis(750));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_dispatched, 1);
        assert_eq!(snapshot.tasks_completed, 2);
        assert_eq!(snapshot.tool_time_ms, 1000);
    }
}
