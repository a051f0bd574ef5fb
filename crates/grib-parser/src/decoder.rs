//! Record decoding.
//!
//! [`RecordDecoder`] turns one GRIB message, given as bytes or as a
//! [`RecordLocator`] into a seekable source, into [`Record`]s. It holds no
//! state beyond its [`DecoderConfig`] and is cheap to clone across workers.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use nwp_common::{Edition, GridDefinition, RecordLocator, RecordMetadata};
use tracing::debug;

use crate::error::{truncated, DecodeError, Result, TableError};
use crate::sections::grib1::{self, Grib1Layout};
use crate::sections::grib2::{self, FieldLayout};
use crate::sections::{
    check_message_bounds, parse_indicator, read_sections, slice_sections, Indicator, RawSection,
    SectionEntry,
};
use crate::tables::ParameterTable;

/// Decoder settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub tables: ParameterTable,
    /// Value written to grid points masked out by a bitmap
    pub missing_value: f64,
    /// Largest grid a record may declare. Records above it are rejected
    /// before anything is allocated for their values.
    pub max_points: usize,
}

/// 2^28 points, 2 GiB of f64 values.
pub const DEFAULT_MAX_POINTS: usize = 1 << 28;

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            tables: ParameterTable::with_defaults(),
            missing_value: f64::NAN,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl DecoderConfig {
    /// Default tables extended by an optional YAML table.
    pub fn with_parameter_table(
        path: Option<&Path>,
        missing_value: f64,
    ) -> std::result::Result<Self, TableError> {
        let mut tables = ParameterTable::with_defaults();
        if let Some(path) = path {
            tables = tables.merge(ParameterTable::from_yaml_file(path)?);
        }
        Ok(Self {
            tables,
            missing_value,
            max_points: DEFAULT_MAX_POINTS,
        })
    }
}

/// One decoded field.
///
/// `values` is row-major, `nj` rows of `ni` columns, in the grid's own
/// scanning direction.
#[derive(Debug, Clone)]
pub struct Record {
    pub metadata: RecordMetadata,
    pub values: Vec<f64>,
}

impl Record {
    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.metadata.grid.shape()
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.values[row * self.metadata.grid.ni + column]
    }
}

/// Metadata of one field and where to find it again.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub locator: RecordLocator,
    pub metadata: RecordMetadata,
}

/// Located sections of one message.
#[derive(Debug)]
pub(crate) enum MessageSections {
    Grib1 {
        sections: Vec<RawSection>,
        layout: Grib1Layout,
    },
    Grib2 {
        indicator: Indicator,
        sections: Vec<RawSection>,
        fields: Vec<FieldLayout>,
    },
}

impl MessageSections {
    fn locate<R: Read + Seek>(
        reader: &mut R,
        offset: u64,
        indicator: &Indicator,
    ) -> Result<Vec<SectionEntry>> {
        match indicator.edition {
            Edition::Grib1 => grib1::locate_sections(reader, offset, indicator.message_length),
            Edition::Grib2 => grib2::locate_sections(reader, offset, indicator.message_length),
        }
    }

    fn assemble(indicator: Indicator, sections: Vec<RawSection>) -> Result<Self> {
        match indicator.edition {
            Edition::Grib1 => {
                let layout = Grib1Layout::from_sections(&sections)?;
                Ok(Self::Grib1 { sections, layout })
            }
            Edition::Grib2 => {
                let fields = grib2::assemble_fields(&sections)?;
                Ok(Self::Grib2 {
                    indicator,
                    sections,
                    fields,
                })
            }
        }
    }

    /// Sections of a complete in-memory message.
    pub(crate) fn from_bytes(indicator: Indicator, message: &Bytes) -> Result<Self> {
        let entries = Self::locate(&mut Cursor::new(&message[..]), 0, &indicator)?;
        Self::assemble(indicator, slice_sections(message, &entries))
    }

    /// Sections of a message inside a stream, reading the bitmap and data
    /// sections only as far as their headers.
    pub(crate) fn read_headers<R: Read + Seek>(
        reader: &mut R,
        offset: u64,
        indicator: Indicator,
    ) -> Result<Self> {
        let entries = Self::locate(reader, offset, &indicator)?;
        let edition = indicator.edition;
        let sections = read_sections(reader, offset, &entries, |number| {
            match (edition, number) {
                (Edition::Grib1, grib1::section::BMS) => Some(6),
                (Edition::Grib1, grib1::section::BDS) => Some(grib1::BDS_HEADER_LENGTH),
                (Edition::Grib2, 6) => Some(6),
                (Edition::Grib2, 7) => Some(5),
                _ => None,
            }
        })?;
        Self::assemble(indicator, sections)
    }

    pub(crate) fn field_count(&self) -> usize {
        match self {
            Self::Grib1 { .. } => 1,
            Self::Grib2 { fields, .. } => fields.len(),
        }
    }

    pub(crate) fn metadata(&self, field: usize, tables: &ParameterTable) -> Result<RecordMetadata> {
        match self {
            Self::Grib1 { sections, layout } => grib1::record_metadata(sections, layout, tables),
            Self::Grib2 {
                indicator,
                sections,
                fields,
            } => grib2::field_metadata(indicator, sections, &fields[field], tables),
        }
    }

    fn values(&self, field: usize, num_points: usize, missing_value: f64) -> Result<Vec<f64>> {
        match self {
            Self::Grib1 { sections, layout } => {
                grib1::field_values(sections, layout, num_points, missing_value)
            }
            Self::Grib2 {
                sections, fields, ..
            } => grib2::field_values(sections, &fields[field], num_points, missing_value),
        }
    }
}

/// Reorder values in scan order so that columns vary fastest.
fn to_row_major(values: Vec<f64>, grid: &GridDefinition) -> Result<Vec<f64>> {
    if grid.scan_mode.alternating_rows {
        return Err(DecodeError::unsupported("boustrophedon scanning"));
    }
    if !grid.scan_mode.j_consecutive {
        return Ok(values);
    }

    // Adjacent points run along j: value (j, i) sits at i * nj + j
    let (nj, ni) = grid.shape();
    let mut reordered = vec![0.0; values.len()];
    for i in 0..ni {
        for j in 0..nj {
            reordered[j * ni + i] = values[i * nj + j];
        }
    }
    Ok(reordered)
}

/// Stateless GRIB1/GRIB2 decoder.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    config: Arc<DecoderConfig>,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl RecordDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode every field of one complete message.
    pub fn decode_message(&self, message: Bytes) -> Result<Vec<Record>> {
        let sections = self.open_message(&message)?;
        (0..sections.field_count())
            .map(|field| self.decode_sections(&sections, field))
            .collect()
    }

    /// Decode field `field` (0-based) of one complete message.
    pub fn decode_field(&self, message: Bytes, field: u16) -> Result<Record> {
        let sections = self.open_message(&message)?;
        let count = sections.field_count();
        if field as usize >= count {
            return Err(DecodeError::corrupt(format!(
                "message has {} fields, field {} requested",
                count, field
            )));
        }
        self.decode_sections(&sections, field as usize)
    }

    /// Metadata of every field of one complete message, without unpacking.
    pub fn read_metadata(&self, message: Bytes) -> Result<Vec<RecordMetadata>> {
        let sections = self.open_message(&message)?;
        (0..sections.field_count())
            .map(|field| self.field_metadata(&sections, field))
            .collect()
    }

    /// Metadata of one field, rejecting grids above `max_points`.
    pub(crate) fn field_metadata(
        &self,
        sections: &MessageSections,
        field: usize,
    ) -> Result<RecordMetadata> {
        let metadata = sections.metadata(field, &self.config.tables)?;
        let declared = metadata.num_points.max(metadata.grid.num_points());
        if declared > self.config.max_points {
            return Err(DecodeError::unsupported(format!(
                "grid of {} points exceeds the limit of {}",
                declared, self.config.max_points
            )));
        }
        Ok(metadata)
    }

    /// Read the message a locator points at and decode its field.
    pub fn decode_at<R: Read + Seek>(&self, reader: &mut R, locator: &RecordLocator) -> Result<Record> {
        let mut buf = vec![0u8; locator.length as usize];
        reader.seek(SeekFrom::Start(locator.offset))?;
        reader
            .read_exact(&mut buf)
            .map_err(|e| truncated(e, "message"))?;

        let record = self.decode_field(Bytes::from(buf), locator.field)?;
        debug!(
            locator = %locator,
            parameter = %record.metadata.parameter,
            step = %record.metadata.step,
            level = record.metadata.level,
            "Decoded record"
        );
        Ok(record)
    }

    fn open_message(&self, message: &Bytes) -> Result<MessageSections> {
        let indicator = parse_indicator(message)?;
        check_message_bounds(&indicator, message)?;
        MessageSections::from_bytes(indicator, message)
    }

    fn decode_sections(&self, sections: &MessageSections, field: usize) -> Result<Record> {
        let metadata = self.field_metadata(sections, field)?;
        let values = sections.values(field, metadata.num_points, self.config.missing_value)?;
        if values.len() != metadata.grid.num_points() {
            return Err(DecodeError::corrupt(format!(
                "{} values unpacked for a grid of {} points",
                values.len(),
                metadata.grid.num_points()
            )));
        }
        let values = to_row_major(values, &metadata.grid)?;
        Ok(Record { metadata, values })
    }
}
