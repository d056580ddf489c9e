use anyhow::{bail, Result};
use archive_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::{ArchiveSink, Archiver, S3ObjectStore},
    sources::ProviderSource,
    table::Table,
    transform::DatasetNormalization,
};
use std::{env, sync::Arc};
use utility_client::{DatasetKind, UtilityApiClient};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: archive_meter <meter_uid> [bills|intervals]");
    }
    let meter_uid = args[1].clone();
    let kinds = match args.get(2) {
        Some(kind) => vec![kind.parse::<DatasetKind>()?],
        None => DatasetKind::ALL.to_vec(),
    };

    let cfg = AppConfig::load()?;

    let provider = UtilityApiClient::new(
        &cfg.provider.base_url,
        cfg.provider.token()?,
        cfg.provider.timeout(),
    )?;
    let store = S3ObjectStore::from_config(&cfg.storage).await;
    let archiver = Archiver::new(store, cfg.storage.bucket.clone())
        .with_retries(cfg.storage.max_retries, cfg.storage.retry_backoff());

    // The uid is taken as given; the directory is not consulted.
    let pipeline: Pipeline<_, Table, _> = Pipeline {
        source: ProviderSource::new(Arc::new(provider), kinds).with_meters(vec![meter_uid]),
        transforms: vec![Arc::new(DatasetNormalization::new(cfg.archive.bills_demand))],
        sink: ArchiveSink::new(archiver),
    };

    let report = pipeline.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed() > 0 {
        bail!("{} of {} datasets failed", report.failed(), report.outcomes.len());
    }

    Ok(())
}
