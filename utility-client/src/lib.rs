pub mod api;
pub mod domain;

pub use api::{ApiError, MeterDataProvider, UtilityApiClient};
pub use domain::{DatasetKind, Meter};
