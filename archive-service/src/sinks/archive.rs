use std::{fmt, io::Write, time::Duration};

use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use time::{Date, OffsetDateTime};
use utility_client::DatasetKind;

use super::object_store::{ObjectStore, StoreError};
use crate::table::Table;

/// Storage key of one archived dataset:
/// `{kind}/{YYYY-MM-DD}/meter_uid_{uid}_{kind}.csv.gz`.
///
/// Downstream jobs read this layout; it must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveKey {
    pub kind: DatasetKind,
    pub load_date: Date,
    pub meter_uid: String,
}

impl ArchiveKey {
    pub fn new(kind: DatasetKind, load_date: Date, meter_uid: impl Into<String>) -> Self {
        Self {
            kind,
            load_date,
            meter_uid: meter_uid.into(),
        }
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{kind}/{date}/meter_uid_{uid}_{kind}.csv.gz",
            kind = self.kind,
            date = format_load_date(self.load_date),
            uid = self.meter_uid,
        )
    }
}

pub fn format_load_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// CSV with a header row and no index column, gzip-compressed.
pub fn encode_csv_gz(table: &Table) -> Result<Vec<u8>, csv::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    table.write_csv(&mut encoder)?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Schema,
    Encode,
    Upload,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Schema => "schema",
            Self::Encode => "encode",
            Self::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveStatus {
    Archived {
        rows: usize,
        bytes: usize,
        /// blake3 of the compressed payload.
        digest: String,
    },
    Failed {
        stage: FailureStage,
        error: String,
    },
}

/// Result of archiving one (meter, dataset). Failures are values, so a batch
/// can record them and move on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    pub meter_uid: String,
    pub kind: DatasetKind,
    pub key: String,
    #[serde(flatten)]
    pub status: ArchiveStatus,
}

impl ArchiveOutcome {
    pub fn failed(key: &ArchiveKey, stage: FailureStage, error: impl fmt::Display) -> Self {
        metrics::counter!(
            "archive_failures_total",
            "dataset" => key.kind.as_str(),
            "stage" => stage.as_str()
        )
        .increment(1);

        Self {
            meter_uid: key.meter_uid.clone(),
            kind: key.kind,
            key: key.to_string(),
            status: ArchiveStatus::Failed {
                stage,
                error: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ArchiveStatus::Archived { .. })
    }
}

/// Writes normalized tables to one bucket.
pub struct Archiver<O> {
    store: O,
    bucket: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<O: ObjectStore> Archiver<O> {
    pub fn new(store: O, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Retry a failed put up to `max_retries` more times, sleeping
    /// `retry_backoff * attempt` in between.
    pub fn with_retries(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Archives under today's (UTC) load date.
    pub async fn archive(&self, table: &Table, meter_uid: &str, kind: DatasetKind) -> ArchiveOutcome {
        self.archive_on(today_utc(), table, meter_uid, kind).await
    }

    pub async fn archive_on(
        &self,
        load_date: Date,
        table: &Table,
        meter_uid: &str,
        kind: DatasetKind,
    ) -> ArchiveOutcome {
        let key = ArchiveKey::new(kind, load_date, meter_uid);
        let rendered = key.to_string();

        tracing::info!(
            meter_uid,
            dataset = %kind,
            rows = table.len(),
            load_date = %format_load_date(load_date),
            "loading rows to object storage"
        );

        let body = match encode_csv_gz(table) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(meter_uid, dataset = %kind, error = %e, "failed to encode archive payload");
                return ArchiveOutcome::failed(&key, FailureStage::Encode, e);
            }
        };
        let bytes = body.len();
        let digest = blake3::hash(&body).to_hex().to_string();

        if let Err(e) = self.put_with_retry(&rendered, body).await {
            tracing::error!(meter_uid, dataset = %kind, key = %rendered, error = %e, "archive upload failed");
            return ArchiveOutcome::failed(&key, FailureStage::Upload, e);
        }

        metrics::counter!("archive_objects_written_total", "dataset" => kind.as_str()).increment(1);
        metrics::counter!("archive_bytes_written_total", "dataset" => kind.as_str()).increment(bytes as u64);
        tracing::info!(key = %rendered, bytes, digest = %digest, "archived");

        ArchiveOutcome {
            meter_uid: meter_uid.to_string(),
            kind,
            key: rendered,
            status: ArchiveStatus::Archived {
                rows: table.len(),
                bytes,
                digest,
            },
        }
    }

    async fn put_with_retry(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let mut attempt: u32 = 0;
        loop {
            match self.store.put_object(&self.bucket, key, body.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "object put failed, retrying with backoff");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
