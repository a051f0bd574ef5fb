//! Parameter identity.
//!
//! A record's parameter is identified both by a short name (e.g. "t", "u")
//! and by the numeric code the producer encoded. The short name comes from a
//! parameter table, so two producers using different tables may disagree on
//! names but never on codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Edition-specific numeric parameter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "edition", rename_all = "lowercase")]
pub enum ParameterCode {
    /// GRIB1 (table 2 version, indicator of parameter)
    Grib1 { table_version: u8, indicator: u8 },
    /// GRIB2 (discipline, parameter category, parameter number)
    Grib2 { discipline: u8, category: u8, number: u8 },
}

impl ParameterCode {
    pub fn grib1(table_version: u8, indicator: u8) -> Self {
        Self::Grib1 {
            table_version,
            indicator,
        }
    }

    pub fn grib2(discipline: u8, category: u8, number: u8) -> Self {
        Self::Grib2 {
            discipline,
            category,
            number,
        }
    }

    /// Name used when no table entry exists for this code.
    pub fn fallback_name(&self) -> String {
        match self {
            Self::Grib1 { indicator, .. } => format!("var{}", indicator),
            Self::Grib2 {
                discipline,
                category,
                number,
            } => format!("p{}_{}_{}", discipline, category, number),
        }
    }
}

impl fmt::Display for ParameterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grib1 {
                table_version,
                indicator,
            } => write!(f, "{}.{}", table_version, indicator),
            Self::Grib2 {
                discipline,
                category,
                number,
            } => write!(f, "{}.{}.{}", discipline, category, number),
        }
    }
}

/// Parses `table.indicator` (GRIB1) or `discipline.category.number` (GRIB2).
impl FromStr for ParameterCode {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Result<Vec<u8>, _> = s.split('.').map(|p| p.trim().parse::<u8>()).collect();
        let parts = parts.map_err(|_| CommonError::InvalidParameterCode(s.to_string()))?;

        match parts.as_slice() {
            [table_version, indicator] => Ok(Self::grib1(*table_version, *indicator)),
            [discipline, category, number] => Ok(Self::grib2(*discipline, *category, *number)),
            _ => Err(CommonError::InvalidParameterCode(s.to_string())),
        }
    }
}

/// Parameter identity: short name plus numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterId {
    pub short_name: String,
    pub code: ParameterCode,
}

impl ParameterId {
    pub fn new(short_name: impl Into<String>, code: ParameterCode) -> Self {
        Self {
            short_name: short_name.into(),
            code,
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.short_name, self.code)
    }
}

/// Descriptive attributes of a parameter, taken from the parameter table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub standard_name: Option<String>,
}

impl ParameterDescription {
    pub fn units_or_unknown(&self) -> &str {
        self.units.as_deref().unwrap_or("unknown")
    }
}
