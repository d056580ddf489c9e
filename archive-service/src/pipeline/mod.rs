use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use utility_client::{ApiError, DatasetKind};

use crate::{sinks::FailureStage, sources::FetchError, table::SchemaError};

/// One dataset for one meter, as it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub meter_uid: String,
    pub kind: DatasetKind,
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("meter directory lookup failed: {0}")]
    Directory(#[source] ApiError),
    #[error("fetching {kind} for meter {meter_uid} failed: {source}")]
    Fetch {
        meter_uid: String,
        kind: DatasetKind,
        #[source]
        source: FetchError,
    },
    #[error("normalizing {kind} for meter {meter_uid} failed: {source}")]
    Schema {
        meter_uid: String,
        kind: DatasetKind,
        #[source]
        source: SchemaError,
    },
}

impl PipelineError {
    /// The (meter, dataset) an error belongs to, if it is a per-meter error.
    pub fn meter(&self) -> Option<(&str, DatasetKind)> {
        match self {
            Self::Directory(_) => None,
            Self::Fetch { meter_uid, kind, .. } | Self::Schema { meter_uid, kind, .. } => {
                Some((meter_uid.as_str(), *kind))
            }
        }
    }

    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Directory(_) | Self::Fetch { .. } => FailureStage::Fetch,
            Self::Schema { .. } => FailureStage::Schema,
        }
    }
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

/// Produces envelopes. Errors returned from `stream` itself end the run;
/// errors yielded inside the stream are per-meter and flow to the sink.
#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> Result<EnvelopeStream<T>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    type Report;

    async fn run<S>(&self, input: S) -> Self::Report
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Sequential batch: envelopes are pulled one at a time, so only one meter
/// is in flight at any point.
pub struct Pipeline<S, T, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<K::Report, PipelineError> {
        let mut stream = self.source.stream().await?;

        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        Ok(self.sink.run(stream).await)
    }
}
