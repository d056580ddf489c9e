use anyhow::{bail, Result};
use archive_service::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    sinks::{ArchiveSink, Archiver, S3ObjectStore},
    sources::ProviderSource,
    table::Table,
    transform::DatasetNormalization,
};
use std::sync::Arc;
use utility_client::UtilityApiClient;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let provider = UtilityApiClient::new(
        &cfg.provider.base_url,
        cfg.provider.token()?,
        cfg.provider.timeout(),
    )?;

    let store = S3ObjectStore::from_config(&cfg.storage).await;
    let archiver = Archiver::new(store, cfg.storage.bucket.clone())
        .with_retries(cfg.storage.max_retries, cfg.storage.retry_backoff());

    tracing::info!(
        bucket = %cfg.storage.bucket,
        datasets = ?cfg.archive.datasets,
        bills_demand = ?cfg.archive.bills_demand,
        "starting archive batch"
    );

    let pipeline: Pipeline<_, Table, _> = Pipeline {
        source: ProviderSource::new(Arc::new(provider), cfg.archive.datasets.clone()),
        transforms: vec![Arc::new(DatasetNormalization::new(cfg.archive.bills_demand))],
        sink: ArchiveSink::new(archiver),
    };

    let report = pipeline.run().await?;

    for failure in report.failures() {
        tracing::warn!(
            meter_uid = %failure.meter_uid,
            dataset = %failure.kind,
            key = %failure.key,
            status = ?failure.status,
            "meter not archived"
        );
    }

    if report.failed() > 0 {
        bail!(
            "{} of {} archive operations failed",
            report.failed(),
            report.outcomes.len()
        );
    }

    Ok(())
}
