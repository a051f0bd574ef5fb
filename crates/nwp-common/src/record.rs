//! Record metadata and locators.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::GridDefinition;
use crate::level::LevelType;
use crate::parameter::{ParameterDescription, ParameterId};
use crate::time::ForecastStep;

/// GRIB edition of the message a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edition {
    Grib1,
    Grib2,
}

impl Edition {
    pub fn number(&self) -> u8 {
        match self {
            Edition::Grib1 => 1,
            Edition::Grib2 => 2,
        }
    }
}

/// Where a record lives: file, byte offset and length of its message, and
/// the field number inside the message (GRIB2 messages may carry several).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordLocator {
    pub path: PathBuf,
    pub offset: u64,
    pub length: u64,
    pub field: u16,
}

impl RecordLocator {
    pub fn new(path: PathBuf, offset: u64, length: u64, field: u16) -> Self {
        Self {
            path,
            offset,
            length,
            field,
        }
    }
}

impl fmt::Display for RecordLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path.display(), self.offset)?;
        if self.field > 0 {
            write!(f, "#{}", self.field)?;
        }
        Ok(())
    }
}

/// Identifying metadata of one decoded record. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub edition: Edition,
    pub parameter: ParameterId,
    pub description: ParameterDescription,
    pub level_type: LevelType,
    pub level: f64,
    pub reference_time: DateTime<Utc>,
    pub step: ForecastStep,
    pub grid: GridDefinition,
    /// Data representation template (GRIB2) or BDS packing flags (GRIB1)
    pub packing: u16,
    /// Number of values the record declares
    pub num_points: usize,
}

impl RecordMetadata {
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.step.valid_time(self.reference_time)
    }
}
