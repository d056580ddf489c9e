use std::time::Duration;

use reqwest::{header, Client, Response};
use url::Url;

use super::{ApiError, MeterDataProvider};
use crate::domain::{DatasetKind, Meter, MeterListing};

pub const DEFAULT_BASE_URL: &str = "https://utilityapi.com/api/v2/";

/// HTTP client for the utility-data provider's v2 API.
///
/// Every request carries the bearer token and declares a JSON content type,
/// even the CSV downloads.
#[derive(Clone)]
pub struct UtilityApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl UtilityApiClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        // `Url::join` drops the last path segment unless the base ends in '/'.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    pub fn meters_url(&self) -> Result<Url, ApiError> {
        Ok(self.base_url.join("meters")?)
    }

    pub fn dataset_url(&self, kind: DatasetKind, meter_uid: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(kind.endpoint())?;
        url.query_pairs_mut().append_pair("meters", meter_uid);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, ApiError> {
        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl MeterDataProvider for UtilityApiClient {
    async fn list_meters(&self) -> Result<Vec<Meter>, ApiError> {
        let url = self.meters_url()?;
        tracing::debug!(%url, "listing meters");

        let body = self.get(url).await?.text().await?;
        let listing: MeterListing = serde_json::from_str(&body)?;
        Ok(listing.meters)
    }

    async fn download_csv(&self, kind: DatasetKind, meter_uid: &str) -> Result<String, ApiError> {
        let url = self.dataset_url(kind, meter_uid)?;
        tracing::debug!(%url, meter_uid, dataset = %kind, "downloading dataset");

        Ok(self.get(url).await?.text().await?)
    }
}
