//! Fakes shared by the unit tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use utility_client::{
    api::ApiError,
    domain::{DatasetKind, Meter, BILLS_SCHEMA, INTERVALS_SCHEMA},
    MeterDataProvider,
};

use crate::{
    sinks::{ObjectStore, StoreError},
    table::Table,
};

pub(crate) fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
    let mut t = Table::new(headers.iter().map(|h| h.to_string()).collect());
    for row in rows {
        assert!(t.push_row(row.iter().map(|c| c.to_string()).collect()));
    }
    t
}

/// Bills export for one meter. Carries an extra provider column
/// (`bill_id`) ahead of the archived ones.
pub(crate) fn bills_csv(meter_uid: &str, rows: usize, with_demand: bool) -> String {
    let mut headers = vec!["bill_id"];
    headers.extend(BILLS_SCHEMA.column_names(with_demand));

    let mut out = headers.join(",");
    out.push('\n');
    for i in 0..rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| match *h {
                "meter_uid" => meter_uid.to_string(),
                "bill_id" => format!("b-{i}"),
                other => format!("{other}-{i}"),
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// Intervals export with the columns reversed and an extra trailing column.
pub(crate) fn intervals_csv(meter_uid: &str, rows: usize) -> String {
    let mut headers = INTERVALS_SCHEMA.column_names(true);
    headers.reverse();
    headers.push("interval_quality");

    let mut out = headers.join(",");
    out.push('\n');
    for i in 0..rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| match *h {
                "meter_uid" => meter_uid.to_string(),
                "interval_kWh" => format!("{i}.0"),
                "net_kWh" => "0.25".to_string(),
                other => format!("{other}-{i}"),
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    meters: Vec<Meter>,
    datasets: HashMap<(DatasetKind, String), Result<String, u16>>,
    listing_status: Option<u16>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_meter(mut self, uid: &str, is_activated: bool, is_archived: bool) -> Self {
        self.meters.push(Meter {
            uid: uid.to_string(),
            is_activated,
            is_archived,
        });
        self
    }

    pub(crate) fn with_csv(mut self, kind: DatasetKind, uid: &str, body: String) -> Self {
        self.datasets.insert((kind, uid.to_string()), Ok(body));
        self
    }

    pub(crate) fn with_status(mut self, kind: DatasetKind, uid: &str, status: u16) -> Self {
        self.datasets.insert((kind, uid.to_string()), Err(status));
        self
    }

    pub(crate) fn with_listing_status(mut self, status: u16) -> Self {
        self.listing_status = Some(status);
        self
    }
}

#[async_trait::async_trait]
impl MeterDataProvider for FakeProvider {
    async fn list_meters(&self) -> Result<Vec<Meter>, ApiError> {
        match self.listing_status {
            Some(status) => Err(ApiError::Status {
                status,
                url: "fake://meters".to_string(),
            }),
            None => Ok(self.meters.clone()),
        }
    }

    async fn download_csv(&self, kind: DatasetKind, meter_uid: &str) -> Result<String, ApiError> {
        match self.datasets.get(&(kind, meter_uid.to_string())) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(ApiError::Status {
                status: *status,
                url: format!("fake://{}/{meter_uid}", kind.endpoint()),
            }),
            // Unknown meters come back as an empty export.
            None => Ok(String::new()),
        }
    }
}

/// Store that rejects the first `failures` puts.
pub(crate) struct FlakyStore<S> {
    pub(crate) inner: S,
    failures: AtomicU32,
}

impl<S> FlakyStore<S> {
    pub(crate) fn new(inner: S, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait::async_trait]
impl<S: ObjectStore> ObjectStore for FlakyStore<S> {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "connection reset by peer".to_string(),
            });
        }
        self.inner.put_object(bucket, key, body).await
    }
}
