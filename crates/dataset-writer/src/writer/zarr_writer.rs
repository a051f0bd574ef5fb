//! Zarr V3 writer.
//!
//! Writes one group per dataset: the data variable, its coordinate arrays and
//! CF attributes. Group attributes carry the global metadata and, for rotated
//! grids, the `rotated_pole` grid mapping block.

use std::path::Path;
use std::sync::Arc;

use nwp_common::AggregatedDataset;
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs::storage::ReadableWritableStorageTraits;
use zarrs_filesystem::FilesystemStore;

use crate::cf::{DatasetLayout, Variable, VariableData, GRID_MAPPING};
use crate::config::{OutputFormat, WriterConfig, ZarrCompression};
use crate::error::{Result, WriterError};
use crate::writer::{prepare_destination, DatasetWriter, WriteSummary};

/// Writer for Zarr V3 directory stores.
pub struct ZarrDatasetWriter {
    config: WriterConfig,
}

impl ZarrDatasetWriter {
    /// Create a new writer with the given configuration.
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    /// Write a layout into any Zarr store.
    pub fn write_layout<S>(&self, store: Arc<S>, layout: &DatasetLayout<'_>) -> Result<u64>
    where
        S: ReadableWritableStorageTraits + ?Sized + 'static,
    {
        let mut attributes = layout.global_attributes.clone();
        if let Some(mapping) = &layout.grid_mapping {
            attributes.insert(GRID_MAPPING.to_string(), mapping.clone().into());
        }

        let mut binding = GroupBuilder::new();
        let group = binding
            .attributes(attributes)
            .build(store.clone(), "/")
            .map_err(|e| WriterError::zarr_error(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| WriterError::zarr_error(e.to_string()))?;

        let mut bytes_written = 0;
        for variable in layout.coordinates.iter().chain(std::iter::once(&layout.data)) {
            bytes_written += self.write_variable(store.clone(), variable, layout.missing_value)?;
        }
        Ok(bytes_written)
    }

    fn write_variable<S>(
        &self,
        storage: Arc<S>,
        variable: &Variable<'_>,
        missing_value: f64,
    ) -> Result<u64>
    where
        S: ReadableWritableStorageTraits + ?Sized + 'static,
    {
        let shape: Vec<u64> = variable.shape.iter().map(|n| *n as u64).collect();
        let chunk_grid: zarrs::array::ChunkGrid = self
            .chunk_shape(variable)
            .try_into()
            .map_err(|e| WriterError::ConfigError(format!("{:?}", e)))?;

        let (data_type, fill_value) = match &variable.data {
            VariableData::Float64(_) => (DataType::Float64, FillValue::from(missing_value)),
            VariableData::Int64(_) => (DataType::Int64, FillValue::from(0i64)),
        };

        let mut binding = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value);
        let mut builder = binding
            .dimension_names(Some(variable.dimensions.iter().copied()))
            .attributes(variable.attributes.clone());
        if self.config.compression != ZarrCompression::None {
            let codec = self.create_compression_codec(variable.data.element_size())?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let path = format!("/{}", variable.name);
        let array = builder
            .build(storage, &path)
            .map_err(|e| WriterError::zarr_error(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| WriterError::zarr_error(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
            .map_err(|e| WriterError::zarr_error(e.to_string()))?;
        match &variable.data {
            VariableData::Float64(values) => array.store_array_subset_elements(&subset, &values[..]),
            VariableData::Int64(values) => array.store_array_subset_elements(&subset, &values[..]),
        }
        .map_err(|e| WriterError::zarr_error(e.to_string()))?;

        debug!(variable = %variable.name, shape = ?variable.shape, "Wrote Zarr array");
        Ok((variable.data.len() * variable.data.element_size()) as u64)
    }

    /// One step and one level per chunk; y and x in square tiles.
    fn chunk_shape(&self, variable: &Variable<'_>) -> Vec<u64> {
        let tile = self.config.chunk_size.max(1);
        variable
            .dimensions
            .iter()
            .zip(&variable.shape)
            .map(|(dim, len)| match *dim {
                "y" | "x" => (*len).min(tile).max(1) as u64,
                "step" | "level" if variable.dimensions.len() > 1 => 1,
                _ => (*len).max(1) as u64,
            })
            .collect()
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| WriterError::ConfigError("Invalid compression level".to_string()))?;

        let shuffle = if self.config.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.config.shuffle {
            Some(typesize)
        } else {
            None
        };

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(WriterError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| WriterError::ConfigError(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

impl DatasetWriter for ZarrDatasetWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Zarr
    }

    fn write(&self, dataset: &AggregatedDataset, destination: &Path) -> Result<WriteSummary> {
        let layout = DatasetLayout::build(dataset)?;
        prepare_destination(destination, self.config.overwrite)?;
        std::fs::create_dir_all(destination)?;

        let store = Arc::new(
            FilesystemStore::new(destination).map_err(|e| WriterError::zarr_error(e.to_string()))?,
        );
        let bytes_written = self.write_layout(store, &layout)?;

        info!(
            destination = %destination.display(),
            parameter = %dataset.parameter,
            shape = ?dataset.shape(),
            compression = %self.config.compression,
            bytes_written,
            "Wrote Zarr dataset"
        );

        Ok(WriteSummary {
            destination: destination.to_path_buf(),
            format: OutputFormat::Zarr,
            variables: layout.variable_names(),
            shape: dataset.shape(),
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cf::tests::sample_dataset;

    #[test]
    fn test_chunk_shapes() {
        let writer = ZarrDatasetWriter::new(WriterConfig {
            chunk_size: 2,
            ..Default::default()
        });
        let dataset = sample_dataset();
        let layout = DatasetLayout::build(&dataset).unwrap();
        assert_eq!(writer.chunk_shape(&layout.data), vec![1, 1, 2, 2]);
        // 1-D coordinates are stored whole
        assert_eq!(writer.chunk_shape(&layout.coordinates[0]), vec![3]);
        assert_eq!(writer.chunk_shape(&layout.coordinates[5]), vec![2, 2]);
    }

    #[test]
    fn test_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t.zarr");
        let writer = ZarrDatasetWriter::new(WriterConfig::default());
        writer.write(&sample_dataset(), &target).unwrap();
        assert!(matches!(
            writer.write(&sample_dataset(), &target),
            Err(WriterError::DestinationExists(_))
        ));
    }
}
