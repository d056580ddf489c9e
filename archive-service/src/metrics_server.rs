use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder and serves `/metrics` on `bind_addr` for
/// the lifetime of the batch.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address {bind_addr}"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    // Ignore error if the handle was already set; this should only be called once.
    let _ = PROM_HANDLE.set(handle);
    describe();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

fn describe() {
    metrics::describe_counter!("dataset_rows_skipped_total", "Malformed provider CSV rows dropped during fetch");
    metrics::describe_counter!("normalization_schema_errors_total", "Datasets missing a required column");
    metrics::describe_counter!("archive_objects_written_total", "Archive objects uploaded");
    metrics::describe_counter!("archive_bytes_written_total", "Compressed bytes uploaded");
    metrics::describe_counter!("archive_failures_total", "Per-meter archive failures by stage");
    metrics::describe_histogram!(
        "archive_end_to_end_latency_seconds",
        metrics::Unit::Seconds,
        "Time from dataset fetch to completed upload"
    );
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(|h| h.render()).unwrap_or_default()
}
