pub mod dataset;
pub mod meter_directory;
pub mod provider;

pub use dataset::{fetch_dataset, FetchError};
pub use meter_directory::active_meters;
pub use provider::ProviderSource;
