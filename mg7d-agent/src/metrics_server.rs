//! Prometheus metrics HTTP server.
//!
//! Installs the `metrics-exporter-prometheus` recorder and serves the
//! text exposition at the configured path, plus `GET /healthz`.
//! The exporter's built-in HTTP listener only serves a fixed layout,
//! so the routes are assembled with `axum` instead.
//!
//! # Usage
//!
//! ```ignore
//! let handle = install_recorder()?;
//! let listener = bind(&config.api.listen).await?;
//! tokio::spawn(serve(listener, config.metrics.path.clone(), handle, cancel));
//! ```

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use mg7d_core::Snapshot;
use mg7d_core::metrics as m;

/// Install the global metrics recorder.
///
/// This function should be called once per process, before any
/// `metrics::gauge!()` calls are expected to record.
///
/// # Errors
///
/// Fails when a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;
    m::describe_all();
    Ok(handle)
}

/// Bind the metrics listener.
pub async fn bind(listen: &str) -> Result<TcpListener> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address '{}': {}", listen, e))?;
    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict api.listen in untrusted networks"
        );
    }
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind metrics listener on {}: {}", addr, e))?;
    Ok(listener)
}

/// Serve the metrics endpoint until the cancel token fires.
///
/// Routes: `GET <path>` (Prometheus text exposition) and `GET /healthz`.
pub async fn serve(
    listener: TcpListener,
    path: String,
    handle: PrometheusHandle,
    cancel: CancellationToken,
) -> Result<()> {
    if !path.starts_with('/') {
        return Err(anyhow::anyhow!(
            "unsupported metrics path '{}': must start with '/'",
            path
        ));
    }

    let addr = listener.local_addr()?;
    let router = Router::new()
        .route(&path, get(render_metrics))
        .route("/healthz", get(healthz))
        .with_state(handle);

    tracing::info!(listen_addr = %addr, path = %path, "metrics endpoint active");

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| anyhow::anyhow!("metrics server failed: {}", e))?;
    Ok(())
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Update the per-instance gauges from a snapshot.
///
/// Every gauge carries the `instance` label so multiple instances can
/// share one exposition.
#[allow(clippy::cast_precision_loss)]
pub fn update_snapshot_gauges(instance: &str, snap: &Snapshot) {
    metrics::gauge!(m::GAUGE_FPS, m::LABEL_INSTANCE => instance.to_owned()).set(snap.fps);
    metrics::gauge!(m::GAUGE_PLAYERS, m::LABEL_INSTANCE => instance.to_owned())
        .set(snap.players as f64);
    metrics::gauge!(m::GAUGE_CHUNKS, m::LABEL_INSTANCE => instance.to_owned())
        .set(snap.chunks as f64);
    metrics::gauge!(m::GAUGE_ENTITIES, m::LABEL_INSTANCE => instance.to_owned())
        .set(snap.entities_total as f64);
    metrics::gauge!(m::GAUGE_ZOMBIES, m::LABEL_INSTANCE => instance.to_owned())
        .set(snap.zombies as f64);
    metrics::gauge!(m::GAUGE_HEAP_MB, m::LABEL_INSTANCE => instance.to_owned()).set(snap.heap_mb);
    metrics::gauge!(m::GAUGE_RSS_MB, m::LABEL_INSTANCE => instance.to_owned()).set(snap.rss_mb);
}
