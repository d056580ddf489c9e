use anyhow::Result;
use archive_service::{config::AppConfig, observability, scan::scan_demand_fields};
use utility_client::UtilityApiClient;

/// Prints which active meters lack a demand field in their bills export.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let provider = UtilityApiClient::new(
        &cfg.provider.base_url,
        cfg.provider.token()?,
        cfg.provider.timeout(),
    )?;

    let scan = scan_demand_fields(&provider).await?;

    for (meter_uid, error) in scan.unavailable() {
        tracing::warn!(meter_uid, error, "bills export unavailable; counted as lacking demand");
    }

    println!("{}", serde_json::to_string_pretty(&scan.report())?);
    Ok(())
}
