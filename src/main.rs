//! reconflow - scope-aware reconnaissance orchestrator
//!
//! Main entry point. Parses the CLI, loads configuration, initializes
//! logging and runs one audit.

use anyhow::{anyhow, Result};
use clap::Parser;
use reconflow::{cli::Cli, config::AppConfig, core::Application, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate().map_err(|e| anyhow!(e))?;

    let mut config = AppConfig::load(&cli.config_path).await?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    // Held until exit so the file writer flushes
    let _log_guard = logging::init_logging_with_config(&config.logging)?;

    if cli.validate_config {
        println!("Configuration OK: {}", cli.config_path.display());
        return Ok(());
    }

    info!("Starting reconflow");

    let app = Application::new(config).await?;
    if let Some(report) = app.run(&cli).await? {
        if report.stopped_on_budget() {
            if let Some(reason) = report.termination {
                eprintln!("!! Run stopped early: {} after {} iterations", reason, report.iterations);
            }
        }
    }

    info!("Application completed successfully");
    Ok(())
}
