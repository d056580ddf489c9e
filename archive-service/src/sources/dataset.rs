use utility_client::{ApiError, DatasetKind, MeterDataProvider};

use crate::table::Table;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("unreadable CSV export: {0}")]
    Csv(#[from] csv::Error),
}

/// Downloads one dataset for `meter_uid` and parses it into a [`Table`].
///
/// Column names are kept exactly as the provider sent them. Malformed rows
/// are dropped and counted rather than failing the fetch.
pub async fn fetch_dataset<P>(provider: &P, meter_uid: &str, kind: DatasetKind) -> Result<Table, FetchError>
where
    P: MeterDataProvider + ?Sized,
{
    let body = provider.download_csv(kind, meter_uid).await?;
    let (table, stats) = Table::read_csv(body.as_bytes())?;

    if stats.skipped > 0 {
        metrics::counter!("dataset_rows_skipped_total", "dataset" => kind.as_str())
            .increment(stats.skipped as u64);
        tracing::warn!(
            meter_uid,
            dataset = %kind,
            skipped = stats.skipped,
            kept = stats.rows,
            "skipped malformed rows in provider export"
        );
    }

    tracing::debug!(meter_uid, dataset = %kind, rows = stats.rows, columns = table.headers().len(), "fetched dataset");
    Ok(table)
}
