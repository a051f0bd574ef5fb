//! Dataset serialization.
//!
//! Writes an [`AggregatedDataset`] as an analysis-ready artifact: a Zarr V3
//! group by default, or a NetCDF-4 file when built with the `netcdf` feature.
//! Both formats carry the same CF layout:
//!
//! ```text
//! <param>(step, level, y, x)   float64, fill = missing value
//! step(step)                   forecast period, hours
//! valid_time(step)             seconds since 1970-01-01
//! level(level)                 level value in the level type's unit
//! y(y), x(x)                   grid-native (rotated) coordinates
//! latitude(y, x)               true latitude
//! longitude(y, x)              true longitude in [-180, 180)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dataset_writer::{create_writer, OutputFormat, WriterConfig};
//!
//! let writer = create_writer(OutputFormat::Zarr, WriterConfig::default())?;
//! let summary = writer.write(&dataset, Path::new("t_2m.zarr"))?;
//! ```
//!
//! [`AggregatedDataset`]: nwp_common::AggregatedDataset

pub mod cf;
pub mod config;
pub mod error;
pub mod writer;

pub use config::{OutputFormat, WriterConfig, ZarrCompression};
pub use error::{Result, WriterError};
pub use writer::{create_writer, DatasetWriter, WriteSummary, ZarrDatasetWriter};

#[cfg(feature = "netcdf")]
pub use writer::NetcdfDatasetWriter;
