//! Logging and observability setup
//!
//! Provides structured logging with:
//! - Multiple console formats (pretty, compact, json)
//! - Optional daily-rolling log file
//! - Event macros for the task lifecycle

use anyhow::{anyhow, Context, Result};
use std::io;
use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::{config::LoggingConfig, error::ReconError};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging with specific configuration.
///
/// The returned guard flushes the log file on drop and must be held for the
/// lifetime of the program when `file_path` is set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = create_env_filter(&config.level)?;
    let format = config.format.to_lowercase();

    let mut layers: Vec<BoxedLayer> = vec![console_layer(&format)];
    let mut guard = None;

    if let Some(path) = &config.file_path {
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("Log file path has no file name: {}", path.display()))?;

        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

        let (writer, worker_guard) = non_blocking(rolling::daily(directory, file_name));
        let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
        layers.push(if format == "json" {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        });
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    info!("Logging system initialized with level: {}", config.level);
    Ok(guard)
}

fn console_layer(format: &str) -> BoxedLayer {
    match format {
        "json" => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
    }
}

/// Create environment filter from log level string
pub fn create_env_filter(level: &str) -> Result<EnvFilter> {
    let base_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => return Err(ReconError::config(format!("Invalid log level: {}", level)).into()),
    };

    let filter = EnvFilter::builder()
        .with_default_directive(base_level.into())
        .from_env()
        .context("Failed to create environment filter")?
        .add_directive("tokio=warn".parse()?)
        .add_directive("mio=warn".parse()?);

    Ok(filter)
}

#[macro_export]
macro_rules! log_task_dispatch {
    ($tool:expr, $target:expr, $attempt:expr) => {
        tracing::info!(
            tool = $tool,
            target = %$target,
            retry_count = $attempt,
            event = "task_dispatch",
            "Dispatching {} against {}",
            $tool,
            $target
        );
    };
}

#[macro_export]
macro_rules! log_task_complete {
    ($tool:expr, $target:expr, $findings:expr, $duration_ms:expr) => {
        tracing::info!(
            tool = $tool,
            target = %$target,
            findings = $findings,
            duration_ms = $duration_ms,
            event = "task_complete",
            "Completed {} against {} in {}ms with {} findings",
            $tool,
            $target,
            $duration_ms,
            $findings
        );
    };
}

#[macro_export]
macro_rules! log_task_failed {
    ($tool:expr, $target:expr, $error:expr) => {{
        let error = &$error;
        tracing::warn!(
            tool = $tool,
            target = %$target,
            error = %error,
            kind = error.kind(),
            recoverable = error.is_recoverable(),
            event = "task_failed",
            "{} against {} failed: {}",
            $tool,
            $target,
            error
        );
    }};
}

#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {{
        let error = &$error;
        tracing::error!(
            error = %error,
            context = $context,
            severity = %error.severity(),
            recoverable = error.is_recoverable(),
            event = "error",
            "Error in {}: {}",
            $context,
            error
        );
    }};
}

/// Logs the duration of an operation when dropped
pub struct TimingLogger {
    name: String,
    start_time: std::time::Instant,
}

impl TimingLogger {
    pub fn start<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        tracing::trace!(operation = %name, event = "timing_start", "Starting timing for: {}", name);

        Self {
            name,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn checkpoint(&self, checkpoint_name: &str) {
        let elapsed = self.start_time.elapsed();
        tracing::debug!(
            operation = %self.name,
            checkpoint = checkpoint_name,
            elapsed_ms = elapsed.as_millis() as u64,
            event = "timing_checkpoint",
            "Checkpoint '{}' in '{}': {}ms",
            checkpoint_name,
            self.name,
            elapsed.as_millis()
        );
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Drop for TimingLogger {
    fn drop(&mut self) {
        let elapsed = self.start_time.elapsed();
        tracing::info!(
            operation = %self.name,
            duration_ms = elapsed.as_millis() as u64,
            event = "timing_complete",
            "Completed '{}' in {}ms",
            self.name,
            elapsed.as_millis()
        );
    }
}
