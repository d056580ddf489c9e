use utility_client::{ApiError, MeterDataProvider};

/// Uids of every activated, non-archived meter, in provider order.
///
/// Listing failures are returned as-is; the caller decides whether a failed
/// directory lookup ends the run.
pub async fn active_meters<P>(provider: &P) -> Result<Vec<String>, ApiError>
where
    P: MeterDataProvider + ?Sized,
{
    let meters = provider.list_meters().await?;
    let total = meters.len();

    let active: Vec<String> = meters
        .into_iter()
        .filter(|m| m.is_active())
        .map(|m| m.uid)
        .collect();

    tracing::info!(total, active = active.len(), "resolved active meters");
    Ok(active)
}
