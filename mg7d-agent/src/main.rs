//! mg7d agent entrypoint.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use mg7d_agent::cli::AgentCli;
use mg7d_agent::instance::InstanceRuntime;
use mg7d_agent::{logging, metrics_server};
use mg7d_core::AgentConfig;

#[tokio::main]
async fn main() {
    let cli = AgentCli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("mg7d: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: AgentCli) -> Result<()> {
    let mut config = AgentConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("config load failed: {}", e))?;

    // CLI overrides take precedence over the config file.
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        println!(
            "configuration OK: {} instance(s), api.listen={}",
            config.instances.len(),
            config.api.listen
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "mg7d agent starting");

    let cancel = CancellationToken::new();

    // Shutdown on SIGINT / SIGTERM.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handler failed"),
            }
            cancel.cancel();
        });
    }

    // Metrics endpoint (off the hot path).
    let mut metrics_task = None;
    if config.metrics.enable {
        let handle = metrics_server::install_recorder()?;
        let listener = metrics_server::bind(&config.api.listen).await?;
        let path = config.metrics.path.clone();
        let cancel = cancel.clone();
        metrics_task = Some(tokio::spawn(async move {
            if let Err(e) = metrics_server::serve(listener, path, handle, cancel).await {
                tracing::error!(error = %e, "metrics server failed");
            }
        }));
    }

    // One runtime per configured instance.
    let mut instance_tasks = Vec::new();
    for inst_cfg in config.instances.clone() {
        let runtime = Arc::new(InstanceRuntime::new(inst_cfg, config.metrics.enable));
        let cancel = cancel.clone();
        instance_tasks.push(tokio::spawn(async move {
            if let Err(e) = runtime.run(cancel).await {
                tracing::error!(instance = %runtime.name(), error = %e, "instance failed");
            }
        }));
    }

    cancel.cancelled().await;
    tracing::info!("mg7d agent shutting down");

    for task in instance_tasks {
        let _ = task.await;
    }
    if let Some(task) = metrics_task {
        let _ = task.await;
    }

    tracing::info!("mg7d agent stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
