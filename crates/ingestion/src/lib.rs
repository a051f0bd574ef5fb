//! Ingestion of GRIB records into analysis-ready datasets.
//!
//! # Architecture
//!
//! - [`RecordIndex`] scans input files for record metadata
//! - [`Selector`] picks the records of one parameter on one level type
//! - [`Aggregator`] decodes them and merges them into a (step, level, y, x)
//!   array, attaching true latitude/longitude from the projector
//! - [`Ingester`] wires these to a dataset writer
//!
//! Problems confined to one record never fail a query; they come back as
//! [`Diagnostic`]s and are logged with `tracing`.

pub mod aggregator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
mod ingester;
pub mod selector;

// Re-exports
pub use aggregator::{Aggregation, Aggregator};
pub use config::IngestConfig;
pub use diagnostics::Diagnostic;
pub use error::{IngestionError, Result};
pub use index::{IndexEntry, IndexOptions, InventoryEntry, RecordIndex};
pub use ingester::{IngestReport, Ingester};
pub use selector::{ParameterSelector, Selector};
