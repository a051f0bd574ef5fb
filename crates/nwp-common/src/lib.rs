//! Common types shared across the NWP ingestion crates.
//!
//! Everything here is plain data: record metadata produced by the decoder,
//! grid definitions compared by the aggregator, coordinate arrays produced by
//! the projector and the aggregated dataset handed to the writers.

pub mod dataset;
pub mod error;
pub mod grid;
pub mod level;
pub mod parameter;
pub mod record;
pub mod time;

pub use dataset::AggregatedDataset;
pub use error::{CommonError, CommonResult};
pub use grid::{
    normalize_longitude, GridCoordinates, GridDefinition, GridProjection, ScanMode, MICRODEGREES,
};
pub use level::LevelType;
pub use parameter::{ParameterCode, ParameterDescription, ParameterId};
pub use record::{Edition, RecordLocator, RecordMetadata};
pub use time::ForecastStep;
