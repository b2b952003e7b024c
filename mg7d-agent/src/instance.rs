//! Per-instance runtime wiring.
//!
//! One [`InstanceRuntime`] owns the closed loop for a single game
//! server: tailer -> status parser -> snapshot store / gauges ->
//! policy engine -> applier -> telnet client. Data flows strictly
//! forward; control flows only via the cancel token.
//!
//! The parser consumer runs inside [`InstanceRuntime::run`]; the
//! tailer, applier, and telnet client run as background tasks.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use mg7d_core::config::InstanceConfig;
use mg7d_core::{AuditRing, SnapshotStore};
use mg7d_guardrail::{Applier, PolicyEngine, TelnetClient, TelnetConfig};
use mg7d_logtail::{Tailer, TailerOptions, parse_status_line};

use crate::metrics_server;

/// Capacity of the audit ring per instance.
const AUDIT_RING_CAPACITY: usize = 1024;
/// Capacity of the applier action queue.
const APPLIER_QUEUE_CAPACITY: usize = 32;

/// Runtime for one configured instance.
pub struct InstanceRuntime {
    name: String,
    cfg: InstanceConfig,
    snapshots: Arc<SnapshotStore>,
    audit: Arc<AuditRing>,
    engine: PolicyEngine,
    client: Option<Arc<TelnetClient>>,
    applier: Option<Arc<Applier<TelnetClient>>>,
    metrics_enabled: bool,
}

impl InstanceRuntime {
    /// Assemble the runtime from an instance configuration.
    ///
    /// The telnet client and applier are only built when the instance
    /// has a telnet host and port; without them policy actions are
    /// evaluated but have nowhere to go and are not enqueued.
    pub fn new(cfg: InstanceConfig, metrics_enabled: bool) -> Self {
        let name = cfg.name.clone();
        let snapshots = Arc::new(SnapshotStore::new());
        let audit = Arc::new(AuditRing::new(AUDIT_RING_CAPACITY));
        let engine = PolicyEngine::from_instance(&cfg);

        let (client, applier) = if !cfg.telnet.host.is_empty() && cfg.telnet.port > 0 {
            let client = Arc::new(TelnetClient::new(TelnetConfig {
                host: cfg.telnet.host.clone(),
                port: cfg.telnet.port,
                password: cfg.telnet.password.clone(),
                rate_limit_per_sec: cfg.telnet.rate_limit_per_sec,
                ..TelnetConfig::default()
            }));
            let applier = Arc::new(Applier::new(
                Arc::clone(&client),
                Arc::clone(&audit),
                APPLIER_QUEUE_CAPACITY,
            ));
            if !cfg.actions.baseline.is_empty() {
                applier.set_baseline(cfg.actions.baseline.clone());
            }
            (Some(client), Some(applier))
        } else {
            tracing::info!(instance = %name, "telnet not configured, remote control disabled");
            (None, None)
        };

        Self {
            name,
            cfg,
            snapshots,
            audit,
            engine,
            client,
            applier,
            metrics_enabled,
        }
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared snapshot store (read by the metrics view and tests).
    pub fn snapshot_store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshots)
    }

    /// Shared audit ring.
    pub fn audit_ring(&self) -> Arc<AuditRing> {
        Arc::clone(&self.audit)
    }

    /// Run the instance loop until cancellation or tailer termination.
    ///
    /// A tailer failure terminates this instance's loop; a supervised
    /// restart is the operator's responsibility.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let (tailer, mut lines) = Tailer::new(&self.cfg.log_path, TailerOptions::default())
            .map_err(|e| anyhow::anyhow!("tailer create failed for {}: {}", self.name, e))?;

        let mut tasks = Vec::new();
        if let Some(client) = &self.client {
            let client = Arc::clone(client);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { client.run(cancel).await }));
        }
        if let Some(applier) = &self.applier {
            let applier = Arc::clone(applier);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { applier.run(cancel).await }));
        }

        let tailer_task = {
            let cancel = cancel.clone();
            let name = self.name.clone();
            tokio::spawn(async move {
                if let Err(e) = tailer.run(cancel.clone()).await {
                    if !cancel.is_cancelled() {
                        tracing::error!(instance = %name, error = %e, "tailer exited");
                    }
                }
            })
        };

        tracing::info!(
            instance = %self.name,
            log_path = %self.cfg.log_path,
            policies = self.engine.policy_count(),
            "instance running"
        );

        // Parser consumer: lines -> snapshot -> gauges -> policy -> applier.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&line),
                    // Tailer stopped and closed the channel.
                    None => break,
                },
            }
        }

        let _ = tailer_task.await;
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!(instance = %self.name, "instance stopped");
        Ok(())
    }

    /// Process one log line end to end. Non-status lines are skipped.
    fn handle_line(&self, line: &str) {
        let Some(snap) = parse_status_line(line) else {
            tracing::trace!(instance = %self.name, "skipping non-status line");
            return;
        };

        self.snapshots.update(snap);
        if self.metrics_enabled {
            metrics_server::update_snapshot_gauges(&self.name, &snap);
        }

        let actions = self.engine.evaluate(&snap);
        if actions.is_empty() {
            return;
        }
        let Some(applier) = &self.applier else {
            tracing::debug!(
                instance = %self.name,
                count = actions.len(),
                "policy emitted actions but telnet is not configured"
            );
            return;
        };
        for action in actions {
            let action_id = action.id.clone();
            if let Err(e) = applier.enqueue(action) {
                tracing::warn!(
                    instance = %self.name,
                    action_id = %action_id,
                    error = %e,
                    "applier enqueue failed"
                );
            }
        }
    }
}
