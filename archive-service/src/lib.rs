pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod scan;
pub mod sinks;
pub mod sources;
pub mod table;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_support;

pub use pipeline::{Envelope, Pipeline, PipelineError};
pub use table::{SchemaError, Table};
