use std::{sync::Arc, time::SystemTime};

use utility_client::{DatasetKind, MeterDataProvider};

use super::{active_meters, fetch_dataset};
use crate::{
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
    table::Table,
};

/// Streams one raw table per (active meter, dataset kind).
///
/// Meters are resolved from the provider directory when the stream starts,
/// unless an explicit list was given. Fetch failures are yielded as
/// per-meter errors so the rest of the batch keeps going.
pub struct ProviderSource {
    provider: Arc<dyn MeterDataProvider>,
    kinds: Vec<DatasetKind>,
    meters: Option<Vec<String>>,
}

impl ProviderSource {
    pub fn new(provider: Arc<dyn MeterDataProvider>, kinds: Vec<DatasetKind>) -> Self {
        Self {
            provider,
            kinds,
            meters: None,
        }
    }

    /// Skip the directory lookup and fetch exactly these meters.
    pub fn with_meters(mut self, meters: Vec<String>) -> Self {
        self.meters = Some(meters);
        self
    }
}

#[async_trait::async_trait]
impl Source<Table> for ProviderSource {
    async fn stream(&self) -> Result<EnvelopeStream<Table>, PipelineError> {
        let meters = match &self.meters {
            Some(meters) => meters.clone(),
            None => active_meters(self.provider.as_ref())
                .await
                .map_err(PipelineError::Directory)?,
        };

        let provider = self.provider.clone();
        let kinds = self.kinds.clone();

        let s = async_stream::stream! {
            for meter_uid in meters {
                for &kind in &kinds {
                    match fetch_dataset(provider.as_ref(), &meter_uid, kind).await {
                        Ok(table) => yield Ok(Envelope {
                            meter_uid: meter_uid.clone(),
                            kind,
                            payload: table,
                            received_at: SystemTime::now(),
                        }),
                        Err(source) => {
                            tracing::error!(meter_uid = %meter_uid, dataset = %kind, error = %source, "dataset fetch failed");
                            yield Err(PipelineError::Fetch {
                                meter_uid: meter_uid.clone(),
                                kind,
                                source,
                            });
                        }
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::test_support::{bills_csv, FakeProvider};

    #[tokio::test]
    async fn yields_one_envelope_per_meter_and_kind() {
        let provider = FakeProvider::new()
            .with_meter("1001", true, false)
            .with_meter("1002", true, false)
            .with_csv(DatasetKind::Bills, "1001", bills_csv("1001", 2, true))
            .with_csv(DatasetKind::Bills, "1002", bills_csv("1002", 5, false));

        let source = ProviderSource::new(Arc::new(provider), vec![DatasetKind::Bills]);
        let items: Vec<_> = source.stream().await.unwrap().collect().await;

        let sizes: Vec<(String, usize)> = items
            .into_iter()
            .map(|r| r.map(|env| (env.meter_uid, env.payload.len())).unwrap())
            .collect();
        assert_eq!(sizes, [("1001".to_string(), 2), ("1002".to_string(), 5)]);
    }

    #[tokio::test]
    async fn explicit_meters_bypass_directory() {
        let provider = FakeProvider::new()
            .with_listing_status(500)
            .with_status(DatasetKind::Intervals, "1001", 404);

        let source = ProviderSource::new(Arc::new(provider), vec![DatasetKind::Intervals])
            .with_meters(vec!["1001".to_string()]);
        let items: Vec<_> = source.stream().await.unwrap().collect().await;

        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.meter(), Some(("1001", DatasetKind::Intervals)));
    }
}
