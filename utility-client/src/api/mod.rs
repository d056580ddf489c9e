pub mod http;

use crate::domain::{DatasetKind, Meter};

pub use http::{UtilityApiClient, DEFAULT_BASE_URL};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read-only view of the utility-data provider.
///
/// Implementations carry their own credential; callers never see the token.
#[async_trait::async_trait]
pub trait MeterDataProvider: Send + Sync {
    /// Every meter on the account, in provider order.
    async fn list_meters(&self) -> Result<Vec<Meter>, ApiError>;

    /// Raw CSV export of one dataset for a single meter.
    async fn download_csv(&self, kind: DatasetKind, meter_uid: &str) -> Result<String, ApiError>;
}
