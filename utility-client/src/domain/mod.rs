pub mod dataset;
pub mod meter;

pub use dataset::{
    ColumnSpec, Coercion, DatasetKind, DatasetSchema, UnknownDatasetKind, BILLS_SCHEMA,
    DEMAND_KW_COLUMN, INTERVALS_SCHEMA,
};
pub use meter::{Meter, MeterListing};
