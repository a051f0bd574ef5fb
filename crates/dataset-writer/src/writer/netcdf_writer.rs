//! NetCDF-4 writer.
//!
//! Emits the same variables and attributes as the Zarr writer. The grid
//! mapping becomes a scalar `rotated_pole` variable, as CF expects.

use std::path::Path;

use netcdf::{AttributeValue, VariableMut};
use nwp_common::AggregatedDataset;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::cf::{DatasetLayout, Variable, VariableData, GRID_MAPPING};
use crate::config::{OutputFormat, WriterConfig, ZarrCompression};
use crate::error::Result;
use crate::writer::{prepare_destination, DatasetWriter, WriteSummary};

/// Writer for NetCDF-4 files.
pub struct NetcdfDatasetWriter {
    config: WriterConfig,
}

impl NetcdfDatasetWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    fn write_variable(&self, file: &mut netcdf::FileMut, variable: &Variable<'_>, missing_value: f64) -> Result<u64> {
        match &variable.data {
            VariableData::Float64(values) => {
                let mut var = file.add_variable::<f64>(&variable.name, &variable.dimensions)?;
                var.set_fill_value(missing_value)?;
                self.compress(&mut var, variable)?;
                put_attributes(&mut var, &variable.attributes)?;
                var.put_values(&values[..], ..)?;
            }
            VariableData::Int64(values) => {
                let mut var = file.add_variable::<i64>(&variable.name, &variable.dimensions)?;
                self.compress(&mut var, variable)?;
                put_attributes(&mut var, &variable.attributes)?;
                var.put_values(&values[..], ..)?;
            }
        }
        debug!(variable = %variable.name, "Wrote NetCDF variable");
        Ok((variable.data.len() * variable.data.element_size()) as u64)
    }

    fn compress(&self, var: &mut VariableMut<'_>, variable: &Variable<'_>) -> Result<()> {
        if variable.dimensions.len() > 1 {
            let tile = self.config.chunk_size.max(1);
            let chunks: Vec<usize> = variable
                .dimensions
                .iter()
                .zip(&variable.shape)
                .map(|(dim, len)| match *dim {
                    "y" | "x" => (*len).min(tile),
                    _ => 1,
                })
                .collect();
            var.set_chunking(&chunks)?;
        }
        // Deflate is the one codec every NetCDF-4 build carries
        if self.config.compression != ZarrCompression::None {
            var.set_compression(self.config.compression_level as i32, self.config.shuffle)?;
        }
        Ok(())
    }
}

/// Attributes except `_FillValue`, which NetCDF sets through the fill mode.
fn put_attributes(var: &mut VariableMut<'_>, attributes: &Map<String, Value>) -> Result<()> {
    for (name, value) in attributes {
        if name == "_FillValue" {
            continue;
        }
        if let Some(value) = attribute_value(value) {
            var.put_attribute(name, value)?;
        }
    }
    Ok(())
}

fn attribute_value(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::String(s) if s == "NaN" => Some(AttributeValue::Double(f64::NAN)),
        Value::String(s) => Some(AttributeValue::Str(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(AttributeValue::Longlong(i)),
            None => n.as_f64().map(AttributeValue::Double),
        },
        Value::Bool(b) => Some(AttributeValue::Uchar(*b as u8)),
        _ => None,
    }
}

impl DatasetWriter for NetcdfDatasetWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Netcdf
    }

    fn write(&self, dataset: &AggregatedDataset, destination: &Path) -> Result<WriteSummary> {
        let layout = DatasetLayout::build(dataset)?;
        prepare_destination(destination, self.config.overwrite)?;

        let mut file = netcdf::create(destination)?;
        for (name, len) in layout.dimensions() {
            file.add_dimension(name, len)?;
        }
        for (name, value) in &layout.global_attributes {
            if let Some(value) = attribute_value(value) {
                file.add_attribute(name, value)?;
            }
        }
        if let Some(mapping) = &layout.grid_mapping {
            let mut var = file.add_variable::<i32>(GRID_MAPPING, &[])?;
            put_attributes(&mut var, mapping)?;
        }

        let mut bytes_written = 0;
        for variable in layout.coordinates.iter().chain(std::iter::once(&layout.data)) {
            bytes_written += self.write_variable(&mut file, variable, layout.missing_value)?;
        }

        info!(
            destination = %destination.display(),
            parameter = %dataset.parameter,
            shape = ?dataset.shape(),
            bytes_written,
            "Wrote NetCDF dataset"
        );

        Ok(WriteSummary {
            destination: destination.to_path_buf(),
            format: OutputFormat::Netcdf,
            variables: layout.variable_names(),
            shape: dataset.shape(),
            bytes_written,
        })
    }
}
