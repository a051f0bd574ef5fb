//! Dataset writers.

mod zarr_writer;

#[cfg(feature = "netcdf")]
mod netcdf_writer;

use std::fs;
use std::path::{Path, PathBuf};

use nwp_common::AggregatedDataset;
use serde::Serialize;
use tracing::info;

use crate::config::{OutputFormat, WriterConfig};
use crate::error::{Result, WriterError};

pub use zarr_writer::ZarrDatasetWriter;

#[cfg(feature = "netcdf")]
pub use netcdf_writer::NetcdfDatasetWriter;

/// What a writer produced.
#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub destination: PathBuf,
    pub format: OutputFormat,
    /// Variables written, coordinates first
    pub variables: Vec<String>,
    /// (steps, levels, rows, columns)
    pub shape: (usize, usize, usize, usize),
    /// Uncompressed size of all variables
    pub bytes_written: u64,
}

/// Serializes a completed dataset to a caller-chosen destination.
pub trait DatasetWriter: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn write(&self, dataset: &AggregatedDataset, destination: &Path) -> Result<WriteSummary>;
}

/// Writer for `format`.
pub fn create_writer(format: OutputFormat, config: WriterConfig) -> Result<Box<dyn DatasetWriter>> {
    config.validate().map_err(WriterError::ConfigError)?;
    match format {
        OutputFormat::Zarr => Ok(Box::new(ZarrDatasetWriter::new(config))),
        #[cfg(feature = "netcdf")]
        OutputFormat::Netcdf => Ok(Box::new(NetcdfDatasetWriter::new(config))),
        #[cfg(not(feature = "netcdf"))]
        OutputFormat::Netcdf => Err(WriterError::FormatUnavailable("netcdf")),
    }
}

/// Refuse an existing destination unless `overwrite` is set, in which case
/// it is removed.
pub(crate) fn prepare_destination(destination: &Path, overwrite: bool) -> Result<()> {
    if fs::symlink_metadata(destination).is_ok() {
        if !overwrite {
            return Err(WriterError::DestinationExists(destination.to_path_buf()));
        }
        info!(destination = %destination.display(), "Replacing existing destination");
        if destination.is_dir() {
            fs::remove_dir_all(destination)?;
        } else {
            fs::remove_file(destination)?;
        }
    }
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_destination_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.zarr");
        fs::create_dir_all(target.join("t")).unwrap();

        assert!(matches!(
            prepare_destination(&target, false),
            Err(WriterError::DestinationExists(_))
        ));
        assert!(target.exists());

        prepare_destination(&target, true).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_missing_parents_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/out.zarr");
        prepare_destination(&target, false).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_netcdf_unavailable_without_feature() {
        assert!(matches!(
            create_writer(OutputFormat::Netcdf, WriterConfig::default()),
            Err(WriterError::FormatUnavailable("netcdf"))
        ));
    }
}
