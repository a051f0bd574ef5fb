//! Error types for dataset writing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing a dataset.
#[derive(Error, Debug)]
pub enum WriterError {
    /// The destination exists and overwriting was not requested.
    #[error("destination {0} already exists")]
    DestinationExists(PathBuf),

    /// The dataset's axes and arrays disagree.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    ZarrError(String),

    /// NetCDF library error.
    #[error("NetCDF error: {0}")]
    NetcdfError(String),

    /// The requested format is not compiled in.
    #[error("output format {0} is not available in this build")]
    FormatUnavailable(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl WriterError {
    /// Create an InvalidDataset error.
    pub fn invalid_dataset(msg: impl Into<String>) -> Self {
        Self::InvalidDataset(msg.into())
    }

    /// Create a ZarrError.
    pub fn zarr_error(msg: impl Into<String>) -> Self {
        Self::ZarrError(msg.into())
    }
}

#[cfg(feature = "netcdf")]
impl From<netcdf::Error> for WriterError {
    fn from(err: netcdf::Error) -> Self {
        Self::NetcdfError(err.to_string())
    }
}

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, WriterError>;
