//! Error types for the ingestion crate.

use dataset_writer::WriterError;
use nwp_common::{GridDefinition, RecordLocator};
use projection::ProjectionError;
use thiserror::Error;

/// Errors that end a query. Problems with individual records are reported
/// as [`Diagnostic`](crate::Diagnostic)s instead.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("No records match {query}; available: {}", format_available(.available))]
    NoMatch {
        query: String,
        available: Vec<String>,
    },

    #[error("Grid of {conflicting} differs from grid of {first}")]
    InconsistentGrid {
        expected: Box<GridDefinition>,
        found: Box<GridDefinition>,
        first: RecordLocator,
        conflicting: RecordLocator,
    },

    #[error("None of the {selected} selected records for {query} could be decoded")]
    EmptyDataset { query: String, selected: usize },

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Failed to write dataset: {0}")]
    Write(#[from] WriterError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "nothing".to_string()
    } else {
        available.join(", ")
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
