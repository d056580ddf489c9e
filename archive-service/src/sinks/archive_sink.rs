use std::time::SystemTime;

use futures::StreamExt;
use serde::Serialize;
use time::Date;

use super::archive::{today_utc, ArchiveKey, ArchiveOutcome, Archiver};
use super::object_store::ObjectStore;
use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    table::Table,
};

/// Per-(meter, dataset) outcomes of one batch run, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<ArchiveOutcome>,
}

impl BatchReport {
    pub fn archived(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.archived()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArchiveOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Terminal stage: archives every envelope and records a failed outcome for
/// every upstream per-meter error. Never stops early.
pub struct ArchiveSink<O> {
    archiver: Archiver<O>,
    load_date: Option<Date>,
}

impl<O: ObjectStore> ArchiveSink<O> {
    pub fn new(archiver: Archiver<O>) -> Self {
        Self {
            archiver,
            load_date: None,
        }
    }

    /// Pin the load date instead of taking it at each write.
    pub fn with_load_date(mut self, load_date: Date) -> Self {
        self.load_date = Some(load_date);
        self
    }

    fn load_date(&self) -> Date {
        self.load_date.unwrap_or_else(today_utc)
    }
}

/// Seconds from fetch to upload, or `None` if the clock stepped backwards.
fn fetch_to_archive_secs(received_at: SystemTime, archived_at: SystemTime) -> Option<f64> {
    archived_at
        .duration_since(received_at)
        .ok()
        .map(|d| d.as_secs_f64())
}

#[async_trait::async_trait]
impl<O> Sink<Table> for ArchiveSink<O>
where
    O: ObjectStore + 'static,
{
    type Report = BatchReport;

    async fn run<S>(&self, mut input: S) -> BatchReport
    where
        S: futures::Stream<Item = Result<Envelope<Table>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut report = BatchReport::default();

        while let Some(item) = input.next().await {
            let outcome = match item {
                Ok(env) => {
                    let outcome = self
                        .archiver
                        .archive_on(self.load_date(), &env.payload, &env.meter_uid, env.kind)
                        .await;
                    if outcome.is_success() {
                        if let Some(secs) = fetch_to_archive_secs(env.received_at, SystemTime::now()) {
                            metrics::histogram!("archive_end_to_end_latency_seconds", "dataset" => env.kind.as_str())
                                .record(secs);
                        }
                    }
                    outcome
                }
                Err(e) => match e.meter() {
                    Some((meter_uid, kind)) => {
                        let key = ArchiveKey::new(kind, self.load_date(), meter_uid);
                        ArchiveOutcome::failed(&key, e.stage(), &e)
                    }
                    None => {
                        tracing::error!(error = %e, "error in upstream pipeline for ArchiveSink");
                        continue;
                    }
                },
            };
            report.outcomes.push(outcome);
        }

        tracing::info!(
            bucket = self.archiver.bucket(),
            archived = report.archived(),
            failed = report.failed(),
            "archive batch finished"
        );
        report
    }
}
